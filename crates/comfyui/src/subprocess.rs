//! Shared subprocess execution for `comfy` CLI invocations.
//!
//! [`run_command`] spawns a prepared [`tokio::process::Command`], captures
//! stdout/stderr, and optionally enforces a timeout. Callers decide what a
//! failed exit means.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors raised before a command could report an exit status.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while waiting for command: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Spawn `cmd`, capture its output, and wait for it to exit.
///
/// With `timeout` set, the child is killed once it elapses
/// (`kill_on_drop`). Without one the wait is unbounded.
pub async fn run_command(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> Result<CommandOutput, CommandError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();

    let mut child = cmd
        .spawn()
        .map_err(|source| CommandError::Spawn { program, source })?;

    // Read both pipes in their own tasks so `child.wait()` can borrow the child.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(CommandError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        },
        None => child.wait().await?,
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let out = run_command(&mut sh("echo out; echo err >&2"), None)
            .await
            .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn reports_nonzero_exit() {
        let out = run_command(&mut sh("exit 3"), None).await.expect("run");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let result = run_command(&mut sh("sleep 30"), Some(Duration::from_millis(200))).await;
        assert_matches!(result, Err(CommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let mut cmd = Command::new("/definitely/not/a/real/binary");
        let result = run_command(&mut cmd, None).await;
        assert_matches!(result, Err(CommandError::Spawn { .. }));
    }
}
