use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Server configuration, resolved from command-line flags with environment
/// variable fallbacks.
///
/// | Flag                   | Env                    | Default      |
/// |------------------------|------------------------|--------------|
/// | `--host`               | `HOST`                 | `0.0.0.0`    |
/// | `--port`               | `PORT`                 | `8888`       |
/// | `--comfyui-path`       | `COMFYUI_PATH`         | required     |
/// | `--comfy-bin`          | `COMFY_BIN`            | `comfy`      |
/// | `--comfy-host`         | `COMFY_HOST`           | `127.0.0.1`  |
/// | `--comfy-port`         | `COMFY_PORT`           | `8188`       |
/// | `--output-path`        | `OUTPUT_PATH`          | temp dir     |
/// | `--model-path`         | `MODEL_PATH`           | none         |
/// | `--max-queue`          | `MAX_QUEUE`            | `10`         |
/// | `--workflow`           | `WORKFLOW_PATH`        | bundled      |
/// | `--workflow-slots`     | `WORKFLOW_SLOTS_PATH`  | bundled      |
/// | `--schema`             | `SCHEMA_PATH`          | bundled      |
/// | `--poll-interval-ms`   | `POLL_INTERVAL_MS`     | `1000`       |
/// | `--poll-attempts`      | `POLL_ATTEMPTS`        | `20`         |
/// | `--run-timeout-secs`   | `RUN_TIMEOUT_SECS`     | none         |
/// | `--ready-timeout-secs` | `READY_TIMEOUT_SECS`   | `60`         |
#[derive(Debug, Clone, Parser)]
#[command(
    name = "imagegate-api",
    version,
    about = "Single-worker HTTP image generation service backed by ComfyUI"
)]
pub struct ServerConfig {
    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port.
    #[arg(long, env = "PORT", default_value_t = 8888)]
    pub port: u16,

    /// ComfyUI installation directory, passed to the CLI as `--workspace`.
    #[arg(long, env = "COMFYUI_PATH")]
    pub comfyui_path: PathBuf,

    /// Command used to invoke the ComfyUI CLI. Split on whitespace, so
    /// `python -m comfy_cli` works.
    #[arg(long, env = "COMFY_BIN", default_value = "comfy")]
    pub comfy_bin: String,

    #[arg(long, env = "COMFY_HOST", default_value = "127.0.0.1")]
    pub comfy_host: String,

    #[arg(long, env = "COMFY_PORT", default_value_t = 8188)]
    pub comfy_port: u16,

    /// Directory ComfyUI writes images to. A temporary directory is
    /// created when unset.
    #[arg(long, env = "OUTPUT_PATH")]
    pub output_path: Option<PathBuf>,

    /// Checkpoint file to load. Its directory is registered as an extra
    /// model search path and its file name is written into the workflow.
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Maximum number of admitted jobs, running one included.
    #[arg(long, env = "MAX_QUEUE", default_value_t = 10)]
    pub max_queue: usize,

    /// Workflow template JSON. Defaults to the bundled template.
    #[arg(long, env = "WORKFLOW_PATH")]
    pub workflow: Option<PathBuf>,

    /// Slot map for a custom workflow template.
    #[arg(long, env = "WORKFLOW_SLOTS_PATH")]
    pub workflow_slots: Option<PathBuf>,

    /// Request schema JSON. Defaults to the bundled schema.
    #[arg(long, env = "SCHEMA_PATH")]
    pub schema: Option<PathBuf>,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[arg(long, env = "POLL_ATTEMPTS", default_value_t = 20)]
    pub poll_attempts: u32,

    /// Upper bound on a single `comfy run`. Unbounded when unset.
    #[arg(long, env = "RUN_TIMEOUT_SECS")]
    pub run_timeout_secs: Option<u64>,

    /// How long to wait for the backend to answer after launch. `0`
    /// skips the readiness probe.
    #[arg(long, env = "READY_TIMEOUT_SECS", default_value_t = 60)]
    pub ready_timeout_secs: u64,
}

impl ServerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        (self.ready_timeout_secs > 0).then(|| Duration::from_secs(self.ready_timeout_secs))
    }
}
