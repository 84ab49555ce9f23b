use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub mod ffmpeg;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns one input video into an HLS tree (master playlist, variant
/// playlists, segments) under `output_dir`.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output_dir: &Path) -> Result<(), TranscodeError>;
}
