use utoipa::OpenApi;
use crate::modules::media::dto::*;
use crate::modules::media::model::EncodingStatus;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::media::handler::upload_video_hls,
        crate::modules::media::handler::get_video_status,
        crate::modules::media::handler::get_encoder_status,
    ),
    components(
        schemas(
            EncodingStatus,
            UploadVideoResponse,
            VideoStatusResponse,
            EncoderStatusResponse,
        )
    ),
    tags(
        (name = "Media", description = "Video upload and HLS encoding")
    )
)]
pub struct ApiDoc;
