//! Workflow execution against the running backend.
//!
//! [`WorkflowRunner`] is the seam between the generation pipeline and the
//! backend. [`ComfyCli`] runs `comfy run --workflow <file> --wait`, which
//! submits the workflow to the instance started by
//! [`crate::process::ComfyProcess`] and blocks until it finishes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use imagegate_core::error::CoreError;

use crate::settings::ComfySettings;
use crate::subprocess::{run_command, CommandError};

/// Executes one materialized workflow file and returns once the backend
/// reports completion.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run(&self, workflow_path: &Path) -> Result<(), CoreError>;
}

/// [`WorkflowRunner`] backed by the `comfy` CLI.
#[derive(Debug, Clone)]
pub struct ComfyCli {
    settings: ComfySettings,
    timeout: Option<Duration>,
}

impl ComfyCli {
    /// `timeout` bounds a single `comfy run`; `None` waits indefinitely.
    pub fn new(settings: ComfySettings, timeout: Option<Duration>) -> Self {
        Self { settings, timeout }
    }
}

#[async_trait]
impl WorkflowRunner for ComfyCli {
    async fn run(&self, workflow_path: &Path) -> Result<(), CoreError> {
        let mut cmd = self.settings.command();
        cmd.arg("run")
            .arg("--workflow")
            .arg(workflow_path)
            .arg("--wait")
            .arg("--host")
            .arg(&self.settings.host)
            .arg("--port")
            .arg(self.settings.port.to_string());

        tracing::debug!(workflow = %workflow_path.display(), "Running workflow");

        let output = match run_command(&mut cmd, self.timeout).await {
            Ok(output) => output,
            Err(CommandError::Timeout { elapsed_ms }) => {
                return Err(CoreError::Backend(format!(
                    "comfy run timed out after {elapsed_ms}ms"
                )))
            }
            Err(CommandError::Spawn { source, .. }) | Err(CommandError::Io(source)) => {
                return Err(CoreError::Io(source))
            }
        };

        if !output.success() {
            let stderr = output.stderr.trim();
            tracing::warn!(
                exit_code = output.exit_code,
                stderr = %stderr,
                "comfy run failed",
            );
            let message = if stderr.is_empty() {
                format!("comfy run exited with status {}", output.exit_code)
            } else {
                stderr.to_string()
            };
            return Err(CoreError::Backend(message));
        }

        tracing::debug!(duration_ms = output.duration_ms, "Workflow finished");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
