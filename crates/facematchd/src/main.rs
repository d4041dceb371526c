use anyhow::{Context, Result};
use facematch_core::OnnxFaceEncoder;
use facematch_store::{FaceStore, SnapshotStore};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        store = %config.store_path.display(),
        model = %config.model_path.display(),
        "facematchd starting"
    );

    let store = SnapshotStore::load(&config.store_path);
    tracing::info!(enrolled = store.len(), students = ?store.all_keys(), "store ready");

    // Load the model up front so a missing file fails startup, not the first request.
    let encoder = OnnxFaceEncoder::load(
        &config.model_path.to_string_lossy(),
        config.detection_confidence,
    )
    .context("failed to load face encoder")?;
    let engine = engine::spawn_engine(encoder)?;

    let state = http::AppState::new(Box::new(store), engine);
    let app = http::router(state, config.max_upload_bytes, config.cors_enabled);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "facematchd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facematchd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
