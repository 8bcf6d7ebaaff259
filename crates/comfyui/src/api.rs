//! REST client for the ComfyUI HTTP API.
//!
//! Only used to probe readiness after launch: `comfy launch --background`
//! returns before the server accepts requests.

use std::time::{Duration, Instant};

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (connection refused, DNS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl ComfyUIApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// `GET /system_stats`. Answers once the server is up.
    pub async fn system_stats(&self) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    /// Poll [`system_stats`](Self::system_stats) every `interval` until it
    /// succeeds or `timeout` elapses. Returns whether the server answered.
    pub async fn wait_until_ready(&self, timeout: Duration, interval: Duration) -> bool {
        let start = Instant::now();
        loop {
            match self.system_stats().await {
                Ok(_) => {
                    tracing::info!(
                        api_url = %self.api_url,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "ComfyUI is ready",
                    );
                    return true;
                }
                Err(e) => {
                    tracing::debug!(api_url = %self.api_url, error = %e, "ComfyUI not ready yet");
                }
            }
            if start.elapsed() + interval > timeout {
                return false;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Return the response unchanged on success, or an
    /// [`ComfyUIApiError::ApiError`] with the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}
