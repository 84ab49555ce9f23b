use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use crate::config::env::{self, EnvKey};

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub minio_url: String,
    pub minio_public_url: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub upload_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub hls_segment_seconds: u32,
    pub hls_key_prefix: String,
    pub encode_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        let minio_url = env::get(EnvKey::MinioUrl)?;

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            minio_public_url: env::get_or(EnvKey::MinioPublicUrl, &minio_url),
            minio_url,
            minio_bucket: env::get(EnvKey::MinioBucket)?,
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            upload_dir: PathBuf::from(env::get_or(EnvKey::UploadDir, "uploads/videos")),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, "ffprobe"),
            hls_segment_seconds: env::get_parsed(EnvKey::HlsSegmentSeconds, 6),
            hls_key_prefix: env::get_or(EnvKey::HlsKeyPrefix, "videos-hls"),
            encode_timeout_secs: env::get_optional(EnvKey::EncodeTimeoutSecs),
        })
    }

    /// Transcoder output lands next to the staged uploads, one directory per job.
    pub fn hls_output_dir(&self) -> PathBuf {
        self.upload_dir.join("hls")
    }

    pub fn encode_timeout(&self) -> Option<Duration> {
        self.encode_timeout_secs.map(Duration::from_secs)
    }
}
