//! Segment and variant entities
//!
//! A segment is one narratable unit of a project's script, ordered by
//! `position` (1-based, contiguous within a project). A variant is an
//! alternate generated audio rendering of a segment and is owned by it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generation status of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Not yet generated (or reset after a text change)
    Pending,
    /// Generation in flight
    Generating,
    /// Audio available at `audio_path`
    Done,
    /// Last generation attempt failed, see `error_message`
    Error,
}

impl SegmentStatus {
    /// Stable string form used by the persistence layer
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::Generating => "generating",
            SegmentStatus::Done => "done",
            SegmentStatus::Error => "error",
        }
    }

    /// Parse the persistence-layer string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SegmentStatus::Pending),
            "generating" => Some(SegmentStatus::Generating),
            "done" => Some(SegmentStatus::Done),
            "error" => Some(SegmentStatus::Error),
            _ => None,
        }
    }
}

/// A persisted speech segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub project_id: String,
    /// 1-based position within the project, contiguous after a sync
    pub position: i64,
    /// Script text as written
    pub text: String,
    /// TTS-safe text produced by the sanitizer
    pub sanitized_text: String,
    /// TTS service identifier used for generation
    pub service: String,
    pub status: SegmentStatus,
    pub audio_path: Option<String>,
    pub duration_seconds: Option<f64>,
    pub error_message: Option<String>,
    /// Variant currently selected as the segment's active audio
    pub selected_variant_id: Option<String>,
    pub voice_sample_id: Option<String>,
    pub magpie_voice: Option<String>,
    /// Pre-refinement source text, when the segment came out of the pipeline
    pub original_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    /// Create a fresh pending segment
    pub fn new(project_id: &str, position: i64, text: &str, sanitized_text: &str, service: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            position,
            text: text.to_string(),
            sanitized_text: sanitized_text.to_string(),
            service: service.to_string(),
            status: SegmentStatus::Pending,
            audio_path: None,
            duration_seconds: None,
            error_message: None,
            selected_variant_id: None,
            voice_sample_id: None,
            magpie_voice: None,
            original_text: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rewrite the segment for new text, invalidating any generated audio.
    ///
    /// Voice parameters (`service`, `voice_sample_id`, `magpie_voice`) are
    /// deliberately left untouched: changing voice without changing text
    /// does not reset audio, and changing text keeps the chosen voice.
    pub fn rewrite(&mut self, position: i64, text: &str, sanitized_text: &str) {
        self.position = position;
        self.text = text.to_string();
        self.sanitized_text = sanitized_text.to_string();
        self.status = SegmentStatus::Pending;
        self.audio_path = None;
        self.duration_seconds = None;
        self.error_message = None;
        self.selected_variant_id = None;
        self.updated_at = Utc::now();
    }
}

/// Alternate generated audio for a segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub segment_id: String,
    pub audio_path: Option<String>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Variant {
    pub fn new(segment_id: &str, audio_path: Option<String>, duration_seconds: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            segment_id: segment_id.to_string(),
            audio_path,
            duration_seconds,
            created_at: Utc::now(),
        }
    }
}
