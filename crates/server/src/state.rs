//! Application State
//!
//! Shared state across all handlers.

use std::path::PathBuf;
use std::sync::Arc;

use narrata_config::Settings;
use narrata_persistence::{Reconciler, SegmentStore};
use narrata_pipeline::RefinePipeline;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Refinement pipeline
    pub pipeline: Arc<RefinePipeline>,
    /// Segment store
    pub store: Arc<dyn SegmentStore>,
    /// Script reconciler
    pub reconciler: Arc<Reconciler>,
    /// Root directory for generated audio files
    pub audio_dir: PathBuf,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Settings,
        pipeline: Arc<RefinePipeline>,
        store: Arc<dyn SegmentStore>,
    ) -> Self {
        let audio_dir = PathBuf::from(&config.storage.audio_dir);
        Self {
            config: Arc::new(config),
            pipeline,
            store: store.clone(),
            reconciler: Arc::new(Reconciler::new(store)),
            audio_dir,
        }
    }
}
