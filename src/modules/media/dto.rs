use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use utoipa::ToSchema;

use super::model::{EncodingStatus, VideoStatus};
use crate::workers::encoder::QueueSnapshot;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadVideoResponse {
    /// Job id; poll `status_url` with it.
    pub id: String,
    pub status: EncodingStatus,
    pub status_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoStatusResponse {
    pub name: String,
    pub status: EncodingStatus,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<VideoStatus> for VideoStatusResponse {
    fn from(v: VideoStatus) -> Self {
        Self {
            name: v.name,
            status: v.status,
            message: v.message,
            created_at: rfc3339(v.created_at),
            updated_at: rfc3339(v.updated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EncoderStatusResponse {
    pub pending: usize,
    pub encoding: Option<String>,
}

impl From<QueueSnapshot> for EncoderStatusResponse {
    fn from(s: QueueSnapshot) -> Self {
        Self {
            pending: s.pending,
            encoding: s.encoding,
        }
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}
