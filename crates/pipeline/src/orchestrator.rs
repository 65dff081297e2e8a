//! Concurrent Refinement Pipeline
//!
//! Drives refine calls over an article's chunks with bounded
//! parallelism, streaming progress events to a single consumer as each
//! chunk resolves. Completion order is whatever the backend returns
//! first; the aggregated segment list is reconstructed in chunk-index
//! order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use crate::chunker;
use crate::events::ProgressEvent;
use crate::refiner::{RefineError, Refiner};
use crate::PipelineError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum simultaneous refine calls
    pub concurrency: usize,
    /// Maximum characters per chunk
    pub chunk_max_chars: usize,
    /// Minimum characters per chunk (chunker tuning hint)
    pub chunk_min_chars: usize,
    /// Heartbeat interval while no completion arrives
    pub heartbeat_interval: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            chunk_max_chars: chunker::DEFAULT_MAX_CHARS,
            chunk_min_chars: chunker::DEFAULT_MIN_CHARS,
            heartbeat_interval: Duration::from_secs(2),
        }
    }
}

/// Concurrent refinement pipeline
pub struct RefinePipeline {
    refiner: Arc<dyn Refiner>,
    options: PipelineOptions,
}

impl RefinePipeline {
    /// Create a new pipeline over a refiner
    pub fn new(refiner: Arc<dyn Refiner>, options: PipelineOptions) -> Self {
        Self { refiner, options }
    }

    /// Refine an article, streaming progress events.
    ///
    /// The returned receiver yields `Splitting` once, then
    /// `ChunkDone`/`ChunkError`/`Heartbeat` in arrival order, and exactly
    /// one terminal `Done`/`FatalError`. Dropping the receiver stops new
    /// refine calls from being dispatched; in-flight calls run to
    /// completion.
    pub fn stream(&self, text: &str) -> mpsc::Receiver<ProgressEvent> {
        let (events, rx) = mpsc::channel(64);
        let refiner = self.refiner.clone();
        let options = self.options.clone();
        let text = text.to_string();

        tokio::spawn(run(refiner, options, text, events));

        rx
    }

    /// Refine an article, returning the aggregated segment list.
    ///
    /// Thin wrapper draining the stream; segments are ordered by chunk
    /// index regardless of completion order.
    pub async fn collect(&self, text: &str) -> Result<Vec<String>, PipelineError> {
        let mut rx = self.stream(text);
        let mut by_index: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        let mut saw_chunk_event = false;
        let mut chunk_count = 0usize;

        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Splitting { chunk_count: n, .. } => chunk_count = n,
                ProgressEvent::ChunkDone { index, segments, .. } => {
                    saw_chunk_event = true;
                    by_index.insert(index, segments);
                }
                ProgressEvent::ChunkError { .. } => saw_chunk_event = true,
                ProgressEvent::Heartbeat { .. } => {}
                ProgressEvent::Done { .. } => {
                    return Ok(by_index.into_values().flatten().collect());
                }
                ProgressEvent::FatalError { detail } => {
                    // A fatal before any chunk resolved (with work pending)
                    // can only be the preflight connection failure.
                    if chunk_count > 0 && !saw_chunk_event {
                        return Err(PipelineError::Connection(detail));
                    }
                    return Err(PipelineError::EmptyResult);
                }
            }
        }

        Err(PipelineError::ChannelClosed)
    }
}

/// Driver task for one pipeline run
async fn run(
    refiner: Arc<dyn Refiner>,
    options: PipelineOptions,
    text: String,
    events: mpsc::Sender<ProgressEvent>,
) {
    let started = Instant::now();

    let chunks = chunker::split(&text, options.chunk_max_chars, options.chunk_min_chars);
    let total = chunks.len();
    tracing::info!(chunks = total, "article chunked");

    if events
        .send(ProgressEvent::Splitting { chunk_count: total, chunks: chunks.clone() })
        .await
        .is_err()
    {
        return;
    }

    if total == 0 {
        let _ = events
            .send(ProgressEvent::FatalError {
                detail: "refinement produced no usable segments".to_string(),
            })
            .await;
        return;
    }

    if let Err(e) = refiner.preflight().await {
        tracing::warn!(error = %e, "refiner backend unreachable");
        let _ = events
            .send(ProgressEvent::FatalError {
                detail: format!("refiner backend unreachable: {e}"),
            })
            .await;
        return;
    }

    // One permit per in-flight refine call; submission is FIFO by index,
    // completion order is up to the backend.
    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let cancelled = Arc::new(AtomicBool::new(false));
    let (results_tx, mut results_rx) =
        mpsc::channel::<(usize, Result<Vec<String>, RefineError>)>(total);

    let submitter = {
        let refiner = refiner.clone();
        let semaphore = semaphore.clone();
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            for (index, chunk) in chunks.into_iter().enumerate() {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                // Cooperative cancellation at the submission boundary:
                // dispatched calls are never cut short, new ones stop here.
                if cancelled.load(Ordering::Relaxed) {
                    break;
                }
                let refiner = refiner.clone();
                let results_tx = results_tx.clone();
                tokio::spawn(async move {
                    let outcome = refiner.refine(&chunk).await;
                    drop(permit);
                    let _ = results_tx.send((index, outcome)).await;
                });
            }
        })
    };

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut aggregated: BTreeMap<usize, Vec<String>> = BTreeMap::new();

    // Drain completions in arrival order, emitting a heartbeat whenever
    // the interval elapses without one. The channel closes once the
    // submitter and every worker have finished, so no task is abandoned.
    loop {
        match timeout(options.heartbeat_interval, results_rx.recv()).await {
            Ok(Some((index, outcome))) => {
                completed += 1;
                let event = match outcome {
                    Ok(segments) => {
                        aggregated.insert(index, segments.clone());
                        ProgressEvent::ChunkDone { index, segments, completed, total }
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(index, error = %e, "chunk refinement failed");
                        ProgressEvent::ChunkError {
                            index,
                            detail: e.to_string(),
                            completed,
                            total,
                        }
                    }
                };
                if events.send(event).await.is_err() {
                    cancelled.store(true, Ordering::Relaxed);
                }
            }
            Ok(None) => break,
            Err(_) => {
                let heartbeat = ProgressEvent::Heartbeat {
                    detail: "refining".to_string(),
                    completed,
                    total,
                    elapsed_seconds: started.elapsed().as_secs(),
                };
                if events.send(heartbeat).await.is_err() {
                    cancelled.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    let _ = submitter.await;

    let total_segments: usize = aggregated.values().map(Vec::len).sum();
    let terminal = if total_segments == 0 {
        ProgressEvent::FatalError {
            detail: "refinement produced no usable segments".to_string(),
        }
    } else {
        ProgressEvent::Done {
            total_segments,
            detail: format!("{} of {} chunks refined", completed - failed, total),
        }
    };
    tracing::info!(
        total_segments,
        failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "refinement run finished"
    );
    let _ = events.send(terminal).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedRefiner;

    #[async_trait]
    impl Refiner for FixedRefiner {
        async fn refine(&self, chunk: &str) -> Result<Vec<String>, RefineError> {
            Ok(vec![chunk.to_string()])
        }

        async fn preflight(&self) -> Result<(), RefineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_collect_blank_input_is_empty_result() {
        let pipeline = RefinePipeline::new(Arc::new(FixedRefiner), PipelineOptions::default());
        let err = pipeline.collect("").await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult));
    }

    #[tokio::test]
    async fn test_collect_round_trips_segments() {
        let pipeline = RefinePipeline::new(Arc::new(FixedRefiner), PipelineOptions::default());
        let segments = pipeline.collect("Hello there.").await.unwrap();
        assert_eq!(segments, vec!["Hello there."]);
    }

    #[tokio::test]
    async fn test_stream_emits_splitting_first() {
        let pipeline = RefinePipeline::new(Arc::new(FixedRefiner), PipelineOptions::default());
        let mut rx = pipeline.stream("One paragraph.");
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::Splitting { chunk_count: 1, .. }));
    }
}
