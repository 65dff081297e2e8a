//! Progress events streamed to pipeline consumers

use serde::{Deserialize, Serialize};

/// Progress event emitted while refining an article.
///
/// A pipeline run emits `Splitting` once, then `ChunkDone`/`ChunkError`
/// in arrival order interleaved with `Heartbeat`s, and terminates with
/// exactly one of `Done` or `FatalError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Local chunking finished
    Splitting {
        chunk_count: usize,
        chunks: Vec<String>,
    },
    /// One chunk refined successfully
    ChunkDone {
        index: usize,
        segments: Vec<String>,
        completed: usize,
        total: usize,
    },
    /// One chunk failed; the run continues
    ChunkError {
        index: usize,
        detail: String,
        completed: usize,
        total: usize,
    },
    /// No completion within the heartbeat interval; liveness signal only
    Heartbeat {
        detail: String,
        completed: usize,
        total: usize,
        elapsed_seconds: u64,
    },
    /// Terminal: run produced segments
    Done {
        total_segments: usize,
        detail: String,
    },
    /// Terminal: backend unreachable or zero usable segments
    FatalError { detail: String },
}

impl ProgressEvent {
    /// Is this one of the two terminal events?
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Done { .. } | ProgressEvent::FatalError { .. })
    }
}
