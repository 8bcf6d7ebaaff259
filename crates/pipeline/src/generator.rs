use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use imagegate_comfyui::runner::WorkflowRunner;
use imagegate_comfyui::watcher::OutputWatcher;
use imagegate_core::error::CoreError;
use imagegate_core::queue::{JobQueue, QueueTicket};
use imagegate_core::request::GenerationRequest;
use imagegate_core::types::{new_job_id, JobId};
use imagegate_core::workflow::WorkflowTemplate;
use tokio::sync::Mutex;

use crate::materialize::TransientWorkflow;

/// The artifact recovered for one job.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub job_id: JobId,
    pub path: PathBuf,
    /// File contents, standard base64.
    pub image_base64: String,
}

/// Runs jobs against the backend strictly one at a time.
///
/// The gate is a fair async mutex, so waiting jobs acquire it in arrival
/// order. It is held from materialization until the artifact has been
/// read, which keeps one job's output recovery from overlapping the next
/// job's backend run.
pub struct Generator {
    template: WorkflowTemplate,
    checkpoint: Option<String>,
    runner: Arc<dyn WorkflowRunner>,
    watcher: OutputWatcher,
    gate: Mutex<()>,
}

impl Generator {
    pub fn new(
        template: WorkflowTemplate,
        checkpoint: Option<String>,
        runner: Arc<dyn WorkflowRunner>,
        watcher: OutputWatcher,
    ) -> Self {
        Self {
            template,
            checkpoint,
            runner,
            watcher,
            gate: Mutex::new(()),
        }
    }

    pub fn template(&self) -> &WorkflowTemplate {
        &self.template
    }

    /// Execute one admitted job under the serialization gate.
    pub async fn generate(
        &self,
        ticket: &QueueTicket,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage, CoreError> {
        let job_id = ticket.job_id();
        let _gate = self.gate.lock().await;
        ticket.mark_running();
        tracing::info!(%job_id, seed = request.seed, "Job running");

        let materialized = self.template.materialize(
            request,
            self.checkpoint.as_deref(),
            &job_id.simple().to_string(),
        )?;

        let before = self.watcher.snapshot().await?;
        {
            let workflow = TransientWorkflow::write(&materialized.graph)?;
            tracing::debug!(%job_id, workflow = %workflow.path().display(), "Workflow materialized");
            self.runner.run(workflow.path()).await?;
        }

        let path = self
            .watcher
            .wait_for_output(&before, materialized.output_prefix.as_deref())
            .await?;
        let bytes = tokio::fs::read(&path).await?;

        tracing::info!(%job_id, path = %path.display(), bytes = bytes.len(), "Image recovered");

        Ok(GeneratedImage {
            job_id,
            path,
            image_base64: STANDARD.encode(bytes),
        })
    }
}

/// Queue admission in front of a [`Generator`].
pub struct Pipeline {
    queue: JobQueue,
    generator: Generator,
}

impl Pipeline {
    pub fn new(queue: JobQueue, generator: Generator) -> Self {
        Self { queue, generator }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Admit `request` and run it to completion.
    ///
    /// Rejects immediately with [`CoreError::QueueFull`] when the queue is
    /// at capacity. Queue membership is released on every exit path when
    /// the ticket drops.
    pub async fn submit(&self, request: GenerationRequest) -> Result<GeneratedImage, CoreError> {
        let job_id = new_job_id();
        let ticket = match self.queue.admit(job_id) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::warn!(%job_id, max = self.queue.max(), "Job rejected, queue full");
                return Err(e);
            }
        };
        tracing::info!(%job_id, queue_len = self.queue.len(), "Job admitted");

        let result = self.generator.generate(&ticket, &request).await;
        match &result {
            Ok(_) => tracing::info!(%job_id, "Job completed"),
            Err(e) => tracing::warn!(%job_id, error = %e, "Job failed"),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
