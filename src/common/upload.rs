use axum::extract::multipart::Field;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid content type: only video/* allowed, got {0}")]
    InvalidContentType(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Streams a multipart video field to `<dir>/<uuid>.<ext>` and returns the
/// staged path. The random name keeps concurrent uploads of identically named
/// files from sharing a job id.
pub async fn stream_to_disk(mut field: Field<'_>, dir: &Path) -> Result<PathBuf, UploadError> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    if !content_type.starts_with("video/") {
        return Err(UploadError::InvalidContentType(content_type));
    }

    let extension = field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp4")
        .to_ascii_lowercase();

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", Uuid::new_v4().as_simple(), extension));

    match write_field(&mut field, &path).await {
        Ok(bytes) => {
            info!("📼 Staged {} ({} bytes)", path.display(), bytes);
            Ok(path)
        }
        Err(e) => {
            error!("Upload error: {}", e);
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}

async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<u64, UploadError> {
    let mut file = File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| UploadError::Stream(e.to_string()))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
