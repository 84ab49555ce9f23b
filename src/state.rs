use crate::config::settings::AppConfig;
use crate::modules::media::repository::StatusStore;
use crate::workers::encoder::EncodeQueue;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub statuses: Arc<dyn StatusStore>,
    pub encoder: EncodeQueue,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        statuses: Arc<dyn StatusStore>,
        encoder: EncodeQueue,
    ) -> Self {
        Self {
            config,
            statuses,
            encoder,
        }
    }
}
