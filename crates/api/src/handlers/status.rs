use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::{AppState, PublicConfig};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub public_configuration: PublicConfig,
    /// Jobs currently admitted, the running one included.
    pub job_queue: usize,
}

/// GET /status -- public configuration and current queue length.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        public_configuration: (*state.public).clone(),
        job_queue: state.pipeline.queue().len(),
    })
}
