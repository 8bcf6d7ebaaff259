use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imagegate_core::error::CoreError;

use crate::response::ErrorResponse;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce `{ "status": "error", "message" }`
/// bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `imagegate_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A request body that could not be read as JSON.
    #[error("{0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                CoreError::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
                CoreError::Backend(msg) => {
                    tracing::error!(error = %msg, "Backend error");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                CoreError::GenerationTimeout { waited_ms } => {
                    tracing::error!(waited_ms, "Generation timed out");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                CoreError::Workflow(msg) => {
                    tracing::error!(error = %msg, "Workflow error");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                CoreError::Io(err) => {
                    tracing::error!(error = %err, "I/O error");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = ErrorResponse::new(self.to_string());
        (status, axum::Json(body)).into_response()
    }
}
