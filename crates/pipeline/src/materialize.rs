//! Transient on-disk copy of a materialized workflow.

use std::io::Write;
use std::path::Path;

use imagegate_core::error::CoreError;
use tempfile::NamedTempFile;

/// A materialized workflow written to a uniquely named temp file.
///
/// The file is deleted when this value drops, whether the backend run
/// succeeded or failed.
#[derive(Debug)]
pub struct TransientWorkflow {
    file: NamedTempFile,
}

impl TransientWorkflow {
    /// Write `graph` as pretty JSON to `workflow-*.json` in the system temp
    /// directory.
    pub fn write(graph: &serde_json::Value) -> Result<Self, CoreError> {
        let mut file = tempfile::Builder::new()
            .prefix("workflow-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(&mut file, graph)
            .map_err(|e| CoreError::Workflow(format!("failed to serialize workflow: {e}")))?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
