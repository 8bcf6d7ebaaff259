use std::path::PathBuf;

use tokio::process::Command;

/// How to reach and drive the ComfyUI backend.
#[derive(Debug, Clone)]
pub struct ComfySettings {
    /// Program used to invoke the CLI (normally `comfy`).
    pub bin: String,
    /// Arguments placed before every CLI invocation, e.g. `-m comfy_cli`
    /// when `bin` is a Python interpreter.
    pub bin_args: Vec<String>,
    /// ComfyUI installation directory (`--workspace`).
    pub workspace: PathBuf,
    pub host: String,
    pub port: u16,
    /// Directory ComfyUI writes generated images to.
    pub output_dir: PathBuf,
}

impl ComfySettings {
    /// Split a command line such as `python -m comfy_cli` into program and
    /// leading arguments. Whitespace-separated; no quoting.
    pub fn split_bin(command_line: &str) -> (String, Vec<String>) {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let bin = parts.next().unwrap_or_else(|| "comfy".to_string());
        (bin, parts.collect())
    }

    /// Base URL of the ComfyUI HTTP API.
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// A CLI command with the global options already applied.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(&self.bin_args)
            .arg("--skip-prompt")
            .arg("--workspace")
            .arg(&self.workspace);
        cmd
    }
}
