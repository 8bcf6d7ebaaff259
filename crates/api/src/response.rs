//! Response envelope types for API handlers.
//!
//! Every body carries a `status` discriminator: `"success"` with the
//! payload, or `"error"` with a human-readable `message`.

use serde::Serialize;

/// `{ "status": "success", "image": "<base64>" }`
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub status: &'static str,
    pub image: String,
}

impl ImageResponse {
    pub fn new(image: String) -> Self {
        Self {
            status: "success",
            image,
        }
    }
}

/// `{ "status": "error", "message": "..." }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: String) -> Self {
        Self {
            status: "error",
            message,
        }
    }
}
