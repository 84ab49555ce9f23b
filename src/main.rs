use anyhow::Context;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::connect_to_db;
use crate::infrastructure::storage::s3::StorageService;
use crate::infrastructure::transcoder::ffmpeg::FfmpegTranscoder;
use crate::modules::media::repository::{StatusStore, VideoStatusRepository};
use crate::state::AppState;
use crate::workers::encoder::{EncodeQueue, EncoderSettings};

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("Missing required environment variable")?;
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Cannot create {}", config.upload_dir.display()))?;

    let db = connect_to_db(&config.database_url).await?;
    let repository = VideoStatusRepository::new(db);
    repository.ensure_schema().await?;
    let statuses: Arc<dyn StatusStore> = Arc::new(repository);

    let storage = StorageService::new(
        &config.minio_url,
        &config.minio_public_url,
        &config.minio_bucket,
        &config.minio_access_key,
        &config.minio_secret_key,
    )
    .await?;

    let transcoder = FfmpegTranscoder::new(
        &config.ffmpeg_path,
        &config.ffprobe_path,
        config.hls_segment_seconds,
    );

    let encoder = EncodeQueue::start(
        Arc::new(transcoder),
        Arc::new(storage),
        statuses.clone(),
        EncoderSettings {
            output_root: config.hls_output_dir(),
            key_prefix: config.hls_key_prefix.clone(),
            timeout: config.encode_timeout(),
        },
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let app = app::create_app(AppState::new(config, statuses, encoder.clone()));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Jobs already admitted still get encoded before exit.
    encoder.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
