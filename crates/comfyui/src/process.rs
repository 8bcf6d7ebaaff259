//! Lifecycle of the single ComfyUI backend instance.
//!
//! [`ComfyProcess::start`] runs the startup protocol once at boot:
//!
//! 1. `comfy tracking disable` (failure ignored)
//! 2. `comfy stop` to clear a stale instance from a previous run
//!    (failure ignored)
//! 3. `comfy launch --background` bound to the configured host/port and
//!    output directory, with the extra model paths descriptor when a
//!    checkpoint was configured
//!
//! A failed launch is fatal. The instance is not restarted if it crashes
//! later.

use crate::model_paths::ModelPaths;
use crate::settings::ComfySettings;
use crate::subprocess::{run_command, CommandError};

/// Fatal backend startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Could not run the ComfyUI CLI: {0}")]
    Command(#[from] CommandError),

    #[error("ComfyUI launch failed (exit {exit_code}): {stderr}")]
    Launch { exit_code: i32, stderr: String },
}

/// Handle to the running ComfyUI instance.
///
/// Owned by the server's top-level context. Holds the model path
/// descriptor so the file outlives the backend that reads it.
#[derive(Debug)]
pub struct ComfyProcess {
    settings: ComfySettings,
    model_paths: Option<ModelPaths>,
}

impl ComfyProcess {
    /// Run the startup protocol and return a handle to the launched instance.
    pub async fn start(
        settings: ComfySettings,
        model_paths: Option<ModelPaths>,
    ) -> Result<Self, StartupError> {
        let process = Self {
            settings,
            model_paths,
        };

        process.best_effort("tracking", &["tracking", "disable"]).await;
        process.best_effort("stop", &["stop"]).await;
        process.launch().await?;

        Ok(process)
    }

    /// Checkpoint file name to substitute into workflows, if configured.
    pub fn checkpoint_name(&self) -> Option<&str> {
        self.model_paths.as_ref().map(ModelPaths::checkpoint_name)
    }

    /// Stop the instance. Best effort; failures are logged.
    pub async fn stop(&self) {
        self.best_effort("stop", &["stop"]).await;
    }

    async fn launch(&self) -> Result<(), StartupError> {
        let mut cmd = self.settings.command();
        cmd.args(["launch", "--background", "--"])
            .arg("--listen")
            .arg(&self.settings.host)
            .arg("--port")
            .arg(self.settings.port.to_string())
            .arg("--output-directory")
            .arg(&self.settings.output_dir);
        if let Some(paths) = &self.model_paths {
            cmd.arg("--extra-model-paths-config").arg(paths.config_path());
        }

        tracing::info!(
            workspace = %self.settings.workspace.display(),
            host = %self.settings.host,
            port = self.settings.port,
            output_dir = %self.settings.output_dir.display(),
            "Launching ComfyUI",
        );

        let output = run_command(&mut cmd, None).await?;
        let stderr = output.stderr.trim();

        if !output.success() || !stderr.is_empty() {
            tracing::error!(exit_code = output.exit_code, stderr = %stderr, "ComfyUI launch failed");
            return Err(StartupError::Launch {
                exit_code: output.exit_code,
                stderr: stderr.to_string(),
            });
        }

        tracing::info!(
            duration_ms = output.duration_ms,
            stdout = %output.stdout.trim(),
            "ComfyUI launched in the background",
        );
        Ok(())
    }

    /// Run a CLI subcommand whose failure is not fatal.
    async fn best_effort(&self, step: &str, args: &[&str]) {
        let mut cmd = self.settings.command();
        cmd.args(args);

        match run_command(&mut cmd, None).await {
            Ok(output) if output.success() => {
                tracing::debug!(step, stdout = %output.stdout.trim(), "ComfyUI CLI step done");
            }
            Ok(output) => {
                tracing::warn!(
                    step,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "ComfyUI CLI step failed, continuing",
                );
            }
            Err(e) => {
                tracing::warn!(step, error = %e, "ComfyUI CLI step could not run, continuing");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use assert_matches::assert_matches;

    use super::*;

    /// Fake `comfy` CLI run through `bash <script>`. Every invocation is
    /// appended to `<dir>/calls.log`.
    fn fake_cli(dir: &Path, body: &str) -> (tempfile::NamedTempFile, ComfySettings) {
        let mut script = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp script");
        writeln!(script, "#!/bin/bash").unwrap();
        writeln!(script, "echo \"$@\" >> '{}/calls.log'", dir.display()).unwrap();
        write!(script, "{body}").unwrap();

        let settings = ComfySettings {
            bin: "bash".into(),
            bin_args: vec![script.path().to_string_lossy().into_owned()],
            workspace: PathBuf::from("/opt/ComfyUI"),
            host: "127.0.0.1".into(),
            port: 8188,
            output_dir: dir.join("out"),
        };
        (script, settings)
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn start_runs_protocol_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (_script, settings) = fake_cli(dir.path(), "exit 0\n");

        let process = ComfyProcess::start(settings, None).await.expect("start");
        assert_eq!(process.checkpoint_name(), None);

        let calls = calls(dir.path());
        assert_eq!(calls.len(), 3);
        assert!(calls[0].ends_with("tracking disable"));
        assert!(calls[1].ends_with("stop"));
        assert!(calls[2].contains("launch --background -- --listen 127.0.0.1 --port 8188"));
        assert!(calls[2].contains("--output-directory"));
        assert!(!calls[2].contains("--extra-model-paths-config"));
    }

    #[tokio::test]
    async fn tracking_and_stop_failures_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"
case "$*" in
  *launch*) exit 0 ;;
  *) echo "no running instance" >&2; exit 1 ;;
esac
"#;
        let (_script, settings) = fake_cli(dir.path(), body);
        assert!(ComfyProcess::start(settings, None).await.is_ok());
    }

    #[tokio::test]
    async fn launch_stderr_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"
case "$*" in
  *launch*) echo "workspace not found" >&2 ;;
esac
exit 0
"#;
        let (_script, settings) = fake_cli(dir.path(), body);
        let result = ComfyProcess::start(settings, None).await;
        assert_matches!(
            result,
            Err(StartupError::Launch { ref stderr, .. }) if stderr == "workspace not found"
        );
    }

    #[tokio::test]
    async fn launch_nonzero_exit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"
case "$*" in
  *launch*) exit 2 ;;
esac
exit 0
"#;
        let (_script, settings) = fake_cli(dir.path(), body);
        let result = ComfyProcess::start(settings, None).await;
        assert_matches!(result, Err(StartupError::Launch { exit_code: 2, .. }));
    }

    #[tokio::test]
    async fn launch_passes_model_paths_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("model.safetensors");
        std::fs::write(&ckpt, b"w").unwrap();
        let paths = ModelPaths::for_checkpoint(&ckpt).unwrap();
        let descriptor = paths.config_path().to_path_buf();

        let (_script, settings) = fake_cli(dir.path(), "exit 0\n");
        let process = ComfyProcess::start(settings, Some(paths)).await.unwrap();

        assert_eq!(process.checkpoint_name(), Some("model.safetensors"));
        let launch = &calls(dir.path())[2];
        assert!(launch.contains(&format!(
            "--extra-model-paths-config {}",
            descriptor.display()
        )));
    }

    #[tokio::test]
    async fn stop_runs_cli_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (_script, settings) = fake_cli(dir.path(), "exit 0\n");
        let process = ComfyProcess::start(settings, None).await.unwrap();

        process.stop().await;
        let calls = calls(dir.path());
        assert_eq!(calls.len(), 4);
        assert!(calls[3].ends_with("stop"));
    }
}
