//! Script reconciliation
//!
//! Merges a new ordered line list into a project's existing segments.
//! The diff is computed as a pure plan so it can be tested without a
//! store; the store applies the plan as one atomic unit. Audio files
//! are never deleted here — invalidated paths are collected and
//! returned so the caller can clean them up after the transaction
//! commits.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use narrata_core::{sanitize, Segment, Variant};

use crate::store::SegmentStore;
use crate::PersistenceError;

/// One mutation in a reconciliation plan
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOp {
    /// Text unchanged but position drifted; move without touching content
    Reposition { id: String, position: i64 },
    /// Text changed: rewrite in place, reset generation state, drop variants
    Rewrite {
        id: String,
        position: i64,
        text: String,
        sanitized_text: String,
    },
    /// New line beyond the old segment count
    Create {
        position: i64,
        text: String,
        sanitized_text: String,
    },
    /// Old segment beyond the new line count; variants go with it
    Delete { id: String },
}

/// Computed reconciliation plan
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    /// TTS service for newly created segments
    pub service: String,
    pub ops: Vec<SegmentOp>,
    pub changed: usize,
    pub added: usize,
    pub removed: usize,
    /// Audio paths invalidated by the plan, for out-of-band deletion
    pub audio_paths_to_delete: Vec<String>,
}

impl ReconcilePlan {
    /// Does the plan mutate anything?
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Result of applying a reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Reloaded segments, ordered by position
    pub segments: Vec<Segment>,
    pub changed: usize,
    pub added: usize,
    pub removed: usize,
    pub audio_paths_to_delete: Vec<String>,
}

/// Compute the index-aligned diff between existing segments and the new
/// script lines.
///
/// Both lists are walked in lockstep. A line is "unchanged" when its
/// trimmed text equals the trimmed text of the segment at the same
/// index; voice parameters are deliberately not compared, so changing
/// voice without changing text keeps the audio.
pub fn plan_reconcile(
    existing: &[(Segment, Vec<Variant>)],
    new_lines: &[String],
    service: &str,
) -> ReconcilePlan {
    let mut ops = Vec::new();
    let mut audio_paths_to_delete = Vec::new();
    let mut changed = 0usize;
    let mut added = 0usize;
    let mut removed = 0usize;

    let overlap = existing.len().min(new_lines.len());

    for i in 0..overlap {
        let (segment, variants) = &existing[i];
        let line = new_lines[i].trim();
        let position = (i + 1) as i64;

        if segment.text.trim() == line {
            if segment.position != position {
                ops.push(SegmentOp::Reposition { id: segment.id.clone(), position });
            }
        } else {
            collect_audio_paths(segment, variants, &mut audio_paths_to_delete);
            ops.push(SegmentOp::Rewrite {
                id: segment.id.clone(),
                position,
                text: line.to_string(),
                sanitized_text: sanitize(line),
            });
            changed += 1;
        }
    }

    for (i, line) in new_lines.iter().enumerate().skip(existing.len()) {
        let line = line.trim();
        ops.push(SegmentOp::Create {
            position: (i + 1) as i64,
            text: line.to_string(),
            sanitized_text: sanitize(line),
        });
        added += 1;
    }

    for (segment, variants) in existing.iter().skip(new_lines.len()) {
        collect_audio_paths(segment, variants, &mut audio_paths_to_delete);
        ops.push(SegmentOp::Delete { id: segment.id.clone() });
        removed += 1;
    }

    ReconcilePlan {
        service: service.to_string(),
        ops,
        changed,
        added,
        removed,
        audio_paths_to_delete,
    }
}

fn collect_audio_paths(segment: &Segment, variants: &[Variant], out: &mut Vec<String>) {
    if let Some(path) = &segment.audio_path {
        out.push(path.clone());
    }
    for variant in variants {
        if let Some(path) = &variant.audio_path {
            out.push(path.clone());
        }
    }
}

/// Applies reconciliation plans against a segment store
pub struct Reconciler {
    store: Arc<dyn SegmentStore>,
    // One lock per project: a plan must be applied against the same
    // snapshot it was computed from.
    project_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self {
            store,
            project_locks: Mutex::new(HashMap::new()),
        }
    }

    fn project_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.project_locks
            .lock()
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }

    /// Merge `new_lines` into the project's persisted segments.
    ///
    /// All mutations are applied as a single atomic unit; on error
    /// nothing is committed and no audio path is returned. Reconciliations
    /// of the same project are serialized, so each run plans against the
    /// state the previous one committed. Deleting the returned paths from
    /// the filesystem is the caller's job, after this call returns.
    pub async fn reconcile(
        &self,
        project_id: &str,
        new_lines: &[String],
        service: &str,
    ) -> Result<ReconcileOutcome, PersistenceError> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let existing = self.store.list_with_variants(project_id).await?;
        let plan = plan_reconcile(&existing, new_lines, service);

        let segments = if plan.is_noop() {
            existing.into_iter().map(|(s, _)| s).collect()
        } else {
            self.store.apply(project_id, &plan).await?
        };

        tracing::info!(
            project_id,
            changed = plan.changed,
            added = plan.added,
            removed = plan.removed,
            orphaned_audio = plan.audio_paths_to_delete.len(),
            "script reconciled"
        );

        Ok(ReconcileOutcome {
            segments,
            changed: plan.changed,
            added: plan.added,
            removed: plan.removed,
            audio_paths_to_delete: plan.audio_paths_to_delete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrata_core::SegmentStatus;

    fn seg(project: &str, position: i64, text: &str) -> Segment {
        Segment::new(project, position, text, text, "magpie")
    }

    fn with_audio(mut segment: Segment, path: &str) -> Segment {
        segment.status = SegmentStatus::Done;
        segment.audio_path = Some(path.to_string());
        segment.duration_seconds = Some(2.0);
        segment
    }

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_script_is_noop() {
        let existing = vec![
            (with_audio(seg("p", 1, "Hello."), "a.wav"), vec![]),
            (with_audio(seg("p", 2, "World."), "b.wav"), vec![]),
        ];
        let plan = plan_reconcile(&existing, &lines(&["Hello.", "World."]), "magpie");

        assert!(plan.is_noop());
        assert_eq!(plan.changed, 0);
        assert_eq!(plan.added, 0);
        assert_eq!(plan.removed, 0);
        assert!(plan.audio_paths_to_delete.is_empty());
    }

    #[test]
    fn test_trim_only_difference_is_unchanged() {
        let existing = vec![(with_audio(seg("p", 1, "Hello."), "a.wav"), vec![])];
        let plan = plan_reconcile(&existing, &lines(&["  Hello.  "]), "magpie");
        assert!(plan.is_noop());
    }

    #[test]
    fn test_change_and_shrink() {
        let a = seg("p", 1, "A.");
        let b = with_audio(seg("p", 2, "B."), "b.wav");
        let c = with_audio(seg("p", 3, "C."), "c.wav");
        let c_variant = Variant::new(&c.id, Some("c-alt.wav".to_string()), Some(1.0));
        let existing = vec![(a, vec![]), (b, vec![]), (c, vec![c_variant])];

        let plan = plan_reconcile(&existing, &lines(&["A.", "B2."]), "magpie");

        assert_eq!(plan.changed, 1);
        assert_eq!(plan.added, 0);
        assert_eq!(plan.removed, 1);
        assert_eq!(plan.audio_paths_to_delete, vec!["b.wav", "c.wav", "c-alt.wav"]);

        assert!(plan.ops.iter().any(|op| matches!(
            op,
            SegmentOp::Rewrite { position: 2, text, .. } if text == "B2."
        )));
        assert!(plan.ops.iter().any(|op| matches!(op, SegmentOp::Delete { .. })));
    }

    #[test]
    fn test_growth_creates_pending_segments() {
        let existing = vec![(seg("p", 1, "One."), vec![])];
        let plan = plan_reconcile(&existing, &lines(&["One.", "Two.", "Three."]), "magpie");

        assert_eq!(plan.added, 2);
        assert_eq!(plan.changed, 0);
        let positions: Vec<i64> = plan
            .ops
            .iter()
            .filter_map(|op| match op {
                SegmentOp::Create { position, .. } => Some(*position),
                _ => None,
            })
            .collect();
        assert_eq!(positions, vec![2, 3]);
    }

    #[test]
    fn test_empty_script_removes_everything() {
        let existing = vec![
            (with_audio(seg("p", 1, "One."), "1.wav"), vec![]),
            (seg("p", 2, "Two."), vec![]),
        ];
        let plan = plan_reconcile(&existing, &[], "magpie");

        assert_eq!(plan.removed, 2);
        assert_eq!(plan.added, 0);
        assert_eq!(plan.audio_paths_to_delete, vec!["1.wav"]);
    }

    #[test]
    fn test_position_drift_corrected_without_reset() {
        // Same text but positions are off by one (e.g. after a bad write).
        let mut s = with_audio(seg("p", 5, "Line."), "line.wav");
        s.position = 5;
        let existing = vec![(s, vec![])];

        let plan = plan_reconcile(&existing, &lines(&["Line."]), "magpie");

        assert_eq!(plan.changed, 0);
        assert!(plan.audio_paths_to_delete.is_empty());
        assert!(matches!(plan.ops.as_slice(), [SegmentOp::Reposition { position: 1, .. }]));
    }

    #[test]
    fn test_sanitized_text_computed_for_new_and_changed() {
        let existing = vec![(seg("p", 1, "Old."), vec![])];
        let plan = plan_reconcile(
            &existing,
            &lines(&["\u{201C}New\u{201D} text.", "And <b>more</b>."]),
            "magpie",
        );

        let sanitized: Vec<&str> = plan
            .ops
            .iter()
            .filter_map(|op| match op {
                SegmentOp::Rewrite { sanitized_text, .. }
                | SegmentOp::Create { sanitized_text, .. } => Some(sanitized_text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sanitized, vec!["\"New\" text.", "And more."]);
    }
}
