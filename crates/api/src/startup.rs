//! One-time loading of the request schema and workflow template, and
//! assembly of [`AppState`] from them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tempfile::TempDir;
use imagegate_comfyui::runner::WorkflowRunner;
use imagegate_comfyui::watcher::OutputWatcher;
use imagegate_core::queue::JobQueue;
use imagegate_core::schema::RequestSchema;
use imagegate_core::workflow::{WorkflowSlots, WorkflowTemplate};
use imagegate_pipeline::{Generator, Pipeline};

use crate::config::ServerConfig;
use crate::state::{AppState, PublicConfig};

/// Load the request schema from `path`, or the bundled one.
pub fn load_schema(path: Option<&Path>) -> anyhow::Result<RequestSchema> {
    let Some(path) = path else {
        return Ok(RequestSchema::bundled()?);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    RequestSchema::from_json_str(&text).with_context(|| format!("loading schema {}", path.display()))
}

/// Load the workflow template from `workflow`, or the bundled one.
///
/// A custom template is named after its file stem. Its slot map comes from
/// `slots` when given, otherwise the bundled template's slot addresses are
/// assumed.
pub fn load_template(
    workflow: Option<&Path>,
    slots: Option<&Path>,
) -> anyhow::Result<WorkflowTemplate> {
    let slots = match slots {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading workflow slots {}", path.display()))?;
            WorkflowSlots::from_json_str(&text)
                .with_context(|| format!("loading workflow slots {}", path.display()))?
        }
        None => WorkflowSlots::default(),
    };

    let Some(path) = workflow else {
        if slots != WorkflowSlots::default() {
            anyhow::bail!("a workflow slot map needs a workflow template");
        }
        return Ok(WorkflowTemplate::bundled()?);
    };

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_string());
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow {}", path.display()))?;
    WorkflowTemplate::from_json_str(&name, &text, slots)
        .with_context(|| format!("loading workflow {}", path.display()))
}

/// Resolve the directory ComfyUI writes images to.
///
/// A configured path is created if missing and made absolute. Without one,
/// a temporary directory is created; it is removed when the returned guard
/// drops.
pub fn resolve_output_dir(configured: Option<&Path>) -> anyhow::Result<(PathBuf, Option<TempDir>)> {
    match configured {
        Some(path) => {
            std::fs::create_dir_all(path)
                .with_context(|| format!("creating output directory {}", path.display()))?;
            let absolute = std::path::absolute(path)
                .with_context(|| format!("resolving output directory {}", path.display()))?;
            Ok((absolute, None))
        }
        None => {
            let dir = tempfile::Builder::new()
                .prefix("imagegate-output-")
                .tempdir()
                .context("creating temporary output directory")?;
            Ok((dir.path().to_path_buf(), Some(dir)))
        }
    }
}

/// Everything needed to wire the generation pipeline, independent of how
/// the backend is reached.
pub struct PipelineParts {
    pub template: WorkflowTemplate,
    pub schema: RequestSchema,
    pub checkpoint: Option<String>,
    pub runner: Arc<dyn WorkflowRunner>,
    pub output_dir: PathBuf,
}

/// Build the shared handler state.
pub fn build_state(config: &ServerConfig, parts: PipelineParts) -> AppState {
    let watcher = OutputWatcher::new(parts.output_dir, config.poll_interval(), config.poll_attempts);
    let public = PublicConfig::new(config.max_queue, parts.template.name());
    let generator = Generator::new(parts.template, parts.checkpoint, parts.runner, watcher);
    let pipeline = Pipeline::new(JobQueue::new(config.max_queue), generator);

    AppState {
        pipeline: Arc::new(pipeline),
        schema: Arc::new(parts.schema),
        public: Arc::new(public),
    }
}

#[cfg(test)]
mod tests {
    use imagegate_core::workflow::BUNDLED_TEMPLATE_NAME;

    use super::*;

    #[test]
    fn defaults_to_bundled_template_and_schema() {
        let template = load_template(None, None).unwrap();
        assert_eq!(template.name(), BUNDLED_TEMPLATE_NAME);
        assert!(load_schema(None).is_ok());
    }

    #[test]
    fn custom_template_is_named_after_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sdxl-portrait.json");
        std::fs::write(&path, imagegate_core::workflow::BUNDLED_TEMPLATE).unwrap();

        let template = load_template(Some(&path), None).unwrap();
        assert_eq!(template.name(), "sdxl-portrait");
    }

    #[test]
    fn template_missing_slot_nodes_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"{"1": {"class_type": "KSampler", "inputs": {}}}"#).unwrap();

        assert!(load_template(Some(&path), None).is_err());
    }

    #[test]
    fn generated_output_dir_lives_as_long_as_its_guard() {
        let (dir, guard) = resolve_output_dir(None).unwrap();
        assert!(dir.is_dir());
        assert!(dir.is_absolute());

        drop(guard);
        assert!(!dir.exists());
    }

    #[test]
    fn configured_output_dir_is_created() {
        let root = tempfile::tempdir().unwrap();
        let wanted = root.path().join("nested").join("output");

        let (dir, guard) = resolve_output_dir(Some(&wanted)).unwrap();
        assert!(guard.is_none());
        assert!(dir.is_dir());
        assert!(dir.is_absolute());
        assert_eq!(dir, wanted);
    }

    #[test]
    fn relative_output_dir_is_made_absolute() {
        let name = format!("imagegate-test-output-{}", std::process::id());
        let relative = Path::new(&name);

        let (dir, _) = resolve_output_dir(Some(relative)).unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with(&name));
        std::fs::remove_dir(&dir).unwrap();
    }

    #[test]
    fn unreadable_schema_is_an_error() {
        let err = load_schema(Some(Path::new("/nonexistent/schema.json"))).unwrap_err();
        assert!(err.to_string().contains("reading schema"));
    }
}
