use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

const MAX_VIDEO_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    let upload = Router::new()
        .route("/medias/upload-video-hls", post(handler::upload_video_hls))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_VIDEO_UPLOAD_BYTES));

    Router::new()
        .route("/medias/video-status/{id}", get(handler::get_video_status))
        .route("/medias/encoder", get(handler::get_encoder_status))
        .merge(upload)
}
