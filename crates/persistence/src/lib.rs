//! Persistence layer for narrata
//!
//! Provides the segment store abstraction with in-memory and SQLite
//! implementations, and the reconciler that merges an edited script
//! into existing persisted segments.

pub mod reconciler;
pub mod sqlite;
pub mod store;

pub use reconciler::{plan_reconcile, ReconcileOutcome, ReconcilePlan, Reconciler, SegmentOp};
pub use sqlite::SqliteSegmentStore;
pub use store::{MemorySegmentStore, SegmentStore};

use thiserror::Error;

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PersistenceError> for narrata_core::Error {
    fn from(err: PersistenceError) -> Self {
        narrata_core::Error::Persistence(err.to_string())
    }
}
