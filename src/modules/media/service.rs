use super::dto::{EncoderStatusResponse, UploadVideoResponse, VideoStatusResponse};
use super::model::EncodingStatus;
use crate::common::response::ApiError;
use crate::common::upload::{stream_to_disk, UploadError};
use crate::state::AppState;
use crate::workers::encoder::EncodeError;
use axum::extract::Multipart;
use tracing::{error, info};

pub struct MediaService;

impl MediaService {
    /// Stages the `video` field and queues it for HLS encoding. Answers as
    /// soon as the job is admitted; the encode itself is followed through
    /// the status endpoint.
    pub async fn upload_video_hls(
        state: AppState,
        mut multipart: Multipart,
    ) -> Result<UploadVideoResponse, ApiError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?
        {
            if field.name() != Some("video") {
                continue;
            }

            let staged = stream_to_disk(field, &state.config.upload_dir)
                .await
                .map_err(|e| match e {
                    UploadError::InvalidContentType(_) | UploadError::Stream(_) => {
                        ApiError::bad_request(e.to_string())
                    }
                    UploadError::Io(_) => ApiError::internal(e.to_string()),
                })?;

            let handle = match state.encoder.enqueue(&staged).await {
                Ok(handle) => handle,
                Err(e) => {
                    error!("Failed to admit {}: {}", staged.display(), e);
                    let _ = tokio::fs::remove_file(&staged).await;
                    return Err(match e {
                        EncodeError::QueueClosed => ApiError::unavailable(e.to_string()),
                        _ => ApiError::internal(e.to_string()),
                    });
                }
            };

            let id = handle.id().to_string();
            info!("Accepted video {} for encoding", id);

            return Ok(UploadVideoResponse {
                status_url: format!("/api/v1/medias/video-status/{}", id),
                id,
                status: EncodingStatus::Pending,
            });
        }

        Err(ApiError::bad_request("No video field found in multipart request"))
    }

    pub async fn get_video_status(state: AppState, id: &str) -> Result<VideoStatusResponse, ApiError> {
        state
            .statuses
            .find(id)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?
            .map(VideoStatusResponse::from)
            .ok_or_else(|| ApiError::not_found(format!("No encode job named {}", id)))
    }

    pub async fn encoder_status(state: AppState) -> EncoderStatusResponse {
        state.encoder.snapshot().await.into()
    }
}
