//! Segment store abstraction
//!
//! The reconciler only needs a handful of primitives; they are behind a
//! trait so the pipeline and server can run against an in-memory store
//! in tests and SQLite in production.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use narrata_core::{Segment, Variant};

use crate::reconciler::{ReconcilePlan, SegmentOp};
use crate::PersistenceError;

/// Durable keyed storage for segments and their variants
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Segments of a project, ordered by position
    async fn list(&self, project_id: &str) -> Result<Vec<Segment>, PersistenceError>;

    /// Segments with their variants, ordered by position
    async fn list_with_variants(
        &self,
        project_id: &str,
    ) -> Result<Vec<(Segment, Vec<Variant>)>, PersistenceError>;

    /// Apply a reconciliation plan as one atomic unit and return the
    /// reloaded segment list. Writes for a project are serialized, so
    /// concurrent reconciliations cannot interleave partial updates.
    async fn apply(
        &self,
        project_id: &str,
        plan: &ReconcilePlan,
    ) -> Result<Vec<Segment>, PersistenceError>;

    /// Insert or replace a segment
    async fn put(&self, segment: &Segment) -> Result<(), PersistenceError>;

    /// Insert or replace a variant
    async fn put_variant(&self, variant: &Variant) -> Result<(), PersistenceError>;

    /// Delete a project's segments and variants (cascade)
    async fn delete_project(&self, project_id: &str) -> Result<(), PersistenceError>;
}

type ProjectSegments = Vec<(Segment, Vec<Variant>)>;

/// In-memory segment store, used by tests and as a zero-setup default
#[derive(Default)]
pub struct MemorySegmentStore {
    // One lock for all projects; reconciliation writes are serialized.
    projects: Mutex<HashMap<String, ProjectSegments>>,
}

impl MemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentStore for MemorySegmentStore {
    async fn list(&self, project_id: &str) -> Result<Vec<Segment>, PersistenceError> {
        Ok(self
            .list_with_variants(project_id)
            .await?
            .into_iter()
            .map(|(s, _)| s)
            .collect())
    }

    async fn list_with_variants(
        &self,
        project_id: &str,
    ) -> Result<Vec<(Segment, Vec<Variant>)>, PersistenceError> {
        let projects = self.projects.lock();
        let mut segments = projects.get(project_id).cloned().unwrap_or_default();
        segments.sort_by_key(|(s, _)| s.position);
        Ok(segments)
    }

    async fn apply(
        &self,
        project_id: &str,
        plan: &ReconcilePlan,
    ) -> Result<Vec<Segment>, PersistenceError> {
        let mut projects = self.projects.lock();
        let mut segments = projects.remove(project_id).unwrap_or_default();

        for op in &plan.ops {
            match op {
                SegmentOp::Reposition { id, position } => {
                    let (segment, _) = segments
                        .iter_mut()
                        .find(|(s, _)| &s.id == id)
                        .ok_or_else(|| missing_segment(id))?;
                    segment.position = *position;
                }
                SegmentOp::Rewrite { id, position, text, sanitized_text } => {
                    let (segment, variants) = segments
                        .iter_mut()
                        .find(|(s, _)| &s.id == id)
                        .ok_or_else(|| missing_segment(id))?;
                    segment.rewrite(*position, text, sanitized_text);
                    variants.clear();
                }
                SegmentOp::Create { position, text, sanitized_text } => {
                    let segment =
                        Segment::new(project_id, *position, text, sanitized_text, &plan.service);
                    segments.push((segment, Vec::new()));
                }
                SegmentOp::Delete { id } => {
                    segments.retain(|(s, _)| &s.id != id);
                }
            }
        }

        segments.sort_by_key(|(s, _)| s.position);
        let reloaded = segments.iter().map(|(s, _)| s.clone()).collect();
        projects.insert(project_id.to_string(), segments);
        Ok(reloaded)
    }

    async fn put(&self, segment: &Segment) -> Result<(), PersistenceError> {
        let mut projects = self.projects.lock();
        let segments = projects.entry(segment.project_id.clone()).or_default();
        if let Some((existing, _)) = segments.iter_mut().find(|(s, _)| s.id == segment.id) {
            *existing = segment.clone();
        } else {
            segments.push((segment.clone(), Vec::new()));
        }
        Ok(())
    }

    async fn put_variant(&self, variant: &Variant) -> Result<(), PersistenceError> {
        let mut projects = self.projects.lock();
        for segments in projects.values_mut() {
            if let Some((_, variants)) = segments.iter_mut().find(|(s, _)| s.id == variant.segment_id)
            {
                if let Some(existing) = variants.iter_mut().find(|v| v.id == variant.id) {
                    *existing = variant.clone();
                } else {
                    variants.push(variant.clone());
                }
                return Ok(());
            }
        }
        Err(PersistenceError::InvalidData(format!(
            "variant references unknown segment {}",
            variant.segment_id
        )))
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), PersistenceError> {
        self.projects.lock().remove(project_id);
        Ok(())
    }
}

fn missing_segment(id: &str) -> PersistenceError {
    PersistenceError::InvalidData(format!("plan references unknown segment {id}"))
}
