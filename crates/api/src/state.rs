use std::sync::Arc;

use imagegate_core::schema::RequestSchema;
use imagegate_pipeline::Pipeline;
use serde::Serialize;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job queue and serialized generator.
    pub pipeline: Arc<Pipeline>,
    /// Request schema, loaded once at startup.
    pub schema: Arc<RequestSchema>,
    /// Configuration reported by `GET /status`.
    pub public: Arc<PublicConfig>,
}

/// The subset of server configuration that is safe to expose. Set at boot
/// and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct PublicConfig {
    pub api_version: String,
    pub max_queue_size: usize,
    pub current_workflow: String,
}

impl PublicConfig {
    pub fn new(max_queue_size: usize, current_workflow: impl Into<String>) -> Self {
        Self {
            api_version: env!("CARGO_PKG_VERSION").to_string(),
            max_queue_size,
            current_workflow: current_workflow.into(),
        }
    }
}
