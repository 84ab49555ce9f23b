use crate::common::response::{ApiResponse, ApiSuccess};
use crate::modules::media::dto::*;
use crate::modules::media::service::MediaService;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
};

/// Upload a video for HLS encoding
/// The file is staged locally and queued; the encode runs in the background.
#[utoipa::path(
    post,
    path = "/api/v1/medias/upload-video-hls",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Video queued for encoding", body = ApiResponse<UploadVideoResponse>),
        (status = 400, description = "Bad Request"),
        (status = 503, description = "Encode queue shut down"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Media"
)]
pub async fn upload_video_hls(
    State(state): State<AppState>,
    multipart: Multipart,
) -> impl IntoResponse {
    match MediaService::upload_video_hls(state, multipart).await {
        Ok(res) => ApiSuccess::accepted(res, "Video queued for encoding").into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/medias/video-status/{id}",
    params(
        ("id" = String, Path, description = "Encode job id (staged file name)")
    ),
    responses(
        (status = 200, description = "Encode status", body = ApiResponse<VideoStatusResponse>),
        (status = 404, description = "Unknown job"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Media"
)]
pub async fn get_video_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match MediaService::get_video_status(state, &id).await {
        Ok(res) => ApiSuccess::ok(res, "Video status retrieved successfully").into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/medias/encoder",
    responses(
        (status = 200, description = "Encode queue state", body = ApiResponse<EncoderStatusResponse>)
    ),
    tag = "Media"
)]
pub async fn get_encoder_status(State(state): State<AppState>) -> impl IntoResponse {
    let res = MediaService::encoder_status(state).await;
    ApiSuccess::ok(res, "Encoder status retrieved successfully").into_response()
}
