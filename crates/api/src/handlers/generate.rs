//! `POST /generate`: validate, admit, generate, return the image.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::ImageResponse;
use crate::state::AppState;

/// Generate one image and return it base64-encoded.
///
/// The body must be a JSON object matching the request schema. Missing
/// optional fields take schema defaults and a missing seed is drawn at
/// random. The response is held open while the job waits in the queue.
/// Dropping the connection cancels the job and frees its queue slot.
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<ImageResponse>> {
    let Json(body) = body.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let request = state.schema.validate(&body)?;

    tracing::debug!(
        seed = request.seed,
        width = request.width,
        height = request.height,
        steps = request.steps,
        "Generation request validated",
    );

    let image = state.pipeline.submit(request).await?;
    Ok(Json(ImageResponse::new(image.image_base64)))
}
