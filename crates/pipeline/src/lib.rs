//! Article refinement pipeline
//!
//! This crate provides the concurrency core of narrata:
//! - Deterministic chunking of article text
//! - Chunk refinement via a remote cleanup backend
//! - A bounded-concurrency orchestrator streaming progress events

pub mod chunker;
pub mod events;
pub mod orchestrator;
pub mod refiner;

pub use chunker::{split, split_default, DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS};
pub use events::ProgressEvent;
pub use orchestrator::{PipelineOptions, RefinePipeline};
pub use refiner::{HttpRefiner, RefineError, Refiner, RefinerOptions};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The refiner backend could not be reached before any work started
    #[error("refiner backend unreachable: {0}")]
    Connection(String),

    /// Every chunk failed or returned no segments
    #[error("refinement produced no usable segments")]
    EmptyResult,

    /// The event stream ended without a terminal event
    #[error("event channel closed")]
    ChannelClosed,
}

impl From<PipelineError> for narrata_core::Error {
    fn from(err: PipelineError) -> Self {
        narrata_core::Error::Pipeline(err.to_string())
    }
}
