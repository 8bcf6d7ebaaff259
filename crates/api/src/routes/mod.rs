pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the generation route tree.
///
/// ```text
/// /generate                                        POST
/// /status                                          GET
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/generate", post(handlers::generate::generate))
        .route("/status", get(handlers::status::status))
}
