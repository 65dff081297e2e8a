//! HTTP Endpoints
//!
//! REST API for refinement and script synchronization.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ServerError;

fn internal(project_id: &str, context: &'static str, e: impl std::fmt::Display) -> StatusCode {
    tracing::error!(project_id, error = %e, "{}", context);
    ServerError::Internal(e.to_string()).into()
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        // Refinement
        .route("/api/projects/:id/refine", post(refine))

        // Script synchronization
        .route("/api/projects/:id/sync", post(sync_script))

        // Segments
        .route("/api/projects/:id/segments", get(list_segments))
        .route("/api/projects/:id", delete(delete_project))

        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))

        // Middleware
        .layer(TraceLayer::new_for_http());

    let router = if state.config.server.cors_permissive {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

/// Refine request
#[derive(Debug, Deserialize)]
struct RefineRequest {
    text: String,
}

/// Refine an article, streaming progress events over SSE.
///
/// The pipeline emits its own heartbeat events while chunks are in
/// flight, so no SSE-level keep-alive is layered on top. Dropping the
/// connection stops new refine calls from being dispatched.
async fn refine(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<RefineRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::info!(
        project_id,
        chars = request.text.chars().count(),
        "refinement requested"
    );

    let rx = state.pipeline.stream(&request.text);
    let stream = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));

    Sse::new(stream)
}

/// Sync request
#[derive(Debug, Deserialize)]
struct SyncRequest {
    lines: Vec<String>,
    #[serde(default = "default_service")]
    service: String,
}

fn default_service() -> String {
    "magpie".to_string()
}

/// Sync response
#[derive(Debug, Serialize)]
struct SyncResponse {
    changed: usize,
    added: usize,
    removed: usize,
    deleted_files: usize,
    segments: Vec<narrata_core::Segment>,
}

/// Merge an edited script into the project's segments.
///
/// The store commits the merge atomically; orphaned audio files are
/// removed here afterwards, so a failed merge never loses audio.
async fn sync_script(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, StatusCode> {
    let outcome = state
        .reconciler
        .reconcile(&project_id, &request.lines, &request.service)
        .await
        .map_err(|e| internal(&project_id, "script sync failed", e))?;

    let deleted_files =
        remove_audio_files(&state.audio_dir, &outcome.audio_paths_to_delete).await;

    Ok(Json(SyncResponse {
        changed: outcome.changed,
        added: outcome.added,
        removed: outcome.removed,
        deleted_files,
        segments: outcome.segments,
    }))
}

/// List a project's segments
async fn list_segments(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let segments = state
        .store
        .list(&project_id)
        .await
        .map_err(|e| internal(&project_id, "segment listing failed", e))?;

    Ok(Json(serde_json::json!({
        "count": segments.len(),
        "segments": segments,
    })))
}

/// Delete a project's segments, variants and audio files
async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let existing = state
        .store
        .list_with_variants(&project_id)
        .await
        .map_err(|e| internal(&project_id, "project lookup failed", e))?;

    let mut audio_paths = Vec::new();
    for (segment, variants) in &existing {
        if let Some(path) = &segment.audio_path {
            audio_paths.push(path.clone());
        }
        for variant in variants {
            if let Some(path) = &variant.audio_path {
                audio_paths.push(path.clone());
            }
        }
    }

    state
        .store
        .delete_project(&project_id)
        .await
        .map_err(|e| internal(&project_id, "project deletion failed", e))?;

    remove_audio_files(&state.audio_dir, &audio_paths).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove invalidated audio files, returning how many were deleted.
/// Missing files are fine; anything else is logged and skipped.
async fn remove_audio_files(audio_dir: &FsPath, paths: &[String]) -> usize {
    let mut deleted = 0usize;
    for path in paths {
        let full = if FsPath::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            audio_dir.join(path)
        };
        match tokio::fs::remove_file(&full).await {
            Ok(()) => deleted += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %full.display(), error = %e, "failed to remove audio file");
            }
        }
    }
    deleted
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "concurrency": state.config.pipeline.concurrency,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use narrata_config::Settings;
    use narrata_persistence::MemorySegmentStore;
    use narrata_pipeline::{PipelineOptions, RefineError, RefinePipeline, Refiner};
    use std::sync::Arc;

    struct EchoRefiner;

    #[async_trait]
    impl Refiner for EchoRefiner {
        async fn refine(&self, chunk: &str) -> Result<Vec<String>, RefineError> {
            Ok(vec![chunk.to_string()])
        }

        async fn preflight(&self) -> Result<(), RefineError> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        let pipeline = Arc::new(RefinePipeline::new(
            Arc::new(EchoRefiner),
            PipelineOptions::default(),
        ));
        AppState::new(Settings::default(), pipeline, Arc::new(MemorySegmentStore::new()))
    }

    #[test]
    fn test_router_creation() {
        let _ = create_router(test_state());
    }

    #[tokio::test]
    async fn test_sync_then_list() {
        let state = test_state();

        let response = sync_script(
            State(state.clone()),
            Path("p1".to_string()),
            Json(SyncRequest {
                lines: vec!["Hello.".to_string(), "World.".to_string()],
                service: "magpie".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.added, 2);
        assert_eq!(response.segments.len(), 2);
        assert_eq!(response.deleted_files, 0);

        let listed = list_segments(State(state), Path("p1".to_string())).await.unwrap();
        assert_eq!(listed.0["count"], 2);
    }

    #[tokio::test]
    async fn test_delete_project_clears_segments() {
        let state = test_state();
        sync_script(
            State(state.clone()),
            Path("p1".to_string()),
            Json(SyncRequest {
                lines: vec!["One.".to_string()],
                service: "magpie".to_string(),
            }),
        )
        .await
        .unwrap();

        let status = delete_project(State(state.clone()), Path("p1".to_string())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let listed = list_segments(State(state), Path("p1".to_string())).await.unwrap();
        assert_eq!(listed.0["count"], 0);
    }
}
