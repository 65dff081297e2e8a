//! Narrata Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use narrata_config::{load_settings, Settings};
use narrata_persistence::SqliteSegmentStore;
use narrata_pipeline::{HttpRefiner, PipelineOptions, RefinePipeline, RefinerOptions};
use narrata_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("NARRATA_ENV").ok();
    let config = load_settings(env.as_deref())?;

    init_tracing();

    tracing::info!("Starting narrata server v{}", env!("CARGO_PKG_VERSION"));

    let refiner = HttpRefiner::new(refiner_options(&config))?;
    let pipeline = Arc::new(RefinePipeline::new(
        Arc::new(refiner),
        pipeline_options(&config),
    ));

    let store = Arc::new(SqliteSegmentStore::connect(&config.storage.database_url).await?);
    tokio::fs::create_dir_all(&config.storage.audio_dir).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, pipeline, store);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn refiner_options(config: &Settings) -> RefinerOptions {
    RefinerOptions {
        base_url: config.refiner.base_url.clone(),
        api_key: config.refiner.api_key.clone(),
        model: config.refiner.model.clone(),
        temperature: config.refiner.temperature,
        max_tokens: config.refiner.max_tokens,
        connect_timeout: Duration::from_secs(config.refiner.connect_timeout_secs),
        read_timeout: Duration::from_secs(config.refiner.read_timeout_secs),
    }
}

fn pipeline_options(config: &Settings) -> PipelineOptions {
    PipelineOptions {
        concurrency: config.pipeline.concurrency,
        chunk_max_chars: config.pipeline.chunk_max_chars,
        chunk_min_chars: config.pipeline.chunk_min_chars,
        heartbeat_interval: Duration::from_secs(config.pipeline.heartbeat_interval_secs),
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "narrata=info,tower_http=info".into());

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
