//! Extra model search path descriptor for ComfyUI.
//!
//! ComfyUI accepts `--extra-model-paths-config <yaml>` to look for models
//! outside its own tree. Given a single checkpoint file, [`ModelPaths`]
//! writes a descriptor declaring the file's directory as a checkpoint
//! root and remembers the file name for the workflow's checkpoint slot.
//! The descriptor is a temp file that lives as long as the value.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Section name used in the generated descriptor.
const SECTION: &str = "imagegate";

#[derive(Debug, thiserror::Error)]
pub enum ModelPathError {
    #[error("Model checkpoint not found: {0}")]
    NotFound(PathBuf),

    #[error("Model path has no file name: {0}")]
    NoFileName(PathBuf),

    #[error("Failed to write model path descriptor: {0}")]
    Io(#[from] std::io::Error),
}

/// A written model-path descriptor plus the checkpoint it points at.
#[derive(Debug)]
pub struct ModelPaths {
    descriptor: NamedTempFile,
    checkpoint_dir: PathBuf,
    checkpoint_name: String,
}

impl ModelPaths {
    /// Split `checkpoint` into directory and file name and write the
    /// descriptor.
    pub fn for_checkpoint(checkpoint: &Path) -> Result<Self, ModelPathError> {
        if !checkpoint.is_file() {
            return Err(ModelPathError::NotFound(checkpoint.to_path_buf()));
        }
        let absolute = std::path::absolute(checkpoint)?;
        let checkpoint_name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ModelPathError::NoFileName(absolute.clone()))?;
        let checkpoint_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ModelPathError::NoFileName(absolute.clone()))?;

        let mut descriptor = tempfile::Builder::new()
            .prefix("extra_model_paths-")
            .suffix(".yaml")
            .tempfile()?;
        descriptor.write_all(render_descriptor(&checkpoint_dir).as_bytes())?;
        descriptor.flush()?;

        tracing::info!(
            descriptor = %descriptor.path().display(),
            checkpoint_dir = %checkpoint_dir.display(),
            checkpoint = %checkpoint_name,
            "Wrote extra model paths descriptor",
        );

        Ok(Self {
            descriptor,
            checkpoint_dir,
            checkpoint_name,
        })
    }

    /// Path passed to `--extra-model-paths-config`.
    pub fn config_path(&self) -> &Path {
        self.descriptor.path()
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// File name written into the workflow's checkpoint slot.
    pub fn checkpoint_name(&self) -> &str {
        &self.checkpoint_name
    }
}

/// Render the YAML descriptor for a checkpoint directory.
fn render_descriptor(dir: &Path) -> String {
    // Single-quoted YAML scalar: the only escape is a doubled quote.
    let quoted = dir.to_string_lossy().replace('\'', "''");
    format!("{SECTION}:\n    checkpoints: '{quoted}'\n")
}
