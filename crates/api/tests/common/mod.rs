#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use clap::Parser;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use imagegate_api::config::ServerConfig;
use imagegate_api::router::build_app_router;
use imagegate_api::startup::{build_state, load_schema, load_template, PipelineParts};
use imagegate_api::state::AppState;
use imagegate_comfyui::runner::WorkflowRunner;
use imagegate_core::error::CoreError;

/// Bytes the fake backend writes as its "image".
pub const IMAGE_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nimagegate-test-image";

/// What the fake backend does with each workflow it receives.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Write [`IMAGE_BYTES`] to `<prefix>_00001_.png` and succeed.
    WriteImage,
    /// Fail with the given error text, as `comfy run` would on stderr.
    Fail(String),
    /// Succeed without writing anything.
    WriteNothing,
    /// Like `WriteImage`, but wait for [`FakeRunner::release`] first.
    Hold,
}

/// In-process stand-in for `comfy run`.
pub struct FakeRunner {
    output_dir: PathBuf,
    backend: Backend,
    delay: Duration,
    gate: Semaphore,
    calls: AtomicUsize,
    spans: Mutex<Vec<(Instant, Instant)>>,
    workflows: Mutex<Vec<serde_json::Value>>,
}

impl FakeRunner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let one held run continue.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Entry/exit instants of every run, in completion order.
    pub fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().unwrap().clone()
    }

    /// The most recent workflow graph received.
    pub fn last_workflow(&self) -> serde_json::Value {
        self.workflows
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("runner was never invoked")
    }

    /// Wait until the runner has been entered `n` times.
    pub async fn wait_for_calls(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.calls() < n {
            assert!(Instant::now() < deadline, "runner not invoked {n} times");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl WorkflowRunner for FakeRunner {
    async fn run(&self, workflow_path: &Path) -> Result<(), CoreError> {
        let entered = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);

        let graph: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(workflow_path).await?)
                .expect("workflow file is JSON");
        self.workflows.lock().unwrap().push(graph.clone());

        if matches!(self.backend, Backend::Hold) {
            self.gate.acquire().await.expect("semaphore open").forget();
        }
        tokio::time::sleep(self.delay).await;

        let result = match &self.backend {
            Backend::WriteImage | Backend::Hold => {
                let prefix = graph["9"]["inputs"]["filename_prefix"]
                    .as_str()
                    .expect("save node has a prefix");
                tokio::fs::write(
                    self.output_dir.join(format!("{prefix}_00001_.png")),
                    IMAGE_BYTES,
                )
                .await?;
                Ok(())
            }
            Backend::Fail(message) => Err(CoreError::Backend(message.clone())),
            Backend::WriteNothing => Ok(()),
        };

        self.spans.lock().unwrap().push((entered, Instant::now()));
        result
    }
}

/// A fully wired application over a fake backend.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub runner: Arc<FakeRunner>,
    _output: TempDir,
}

impl TestApp {
    pub fn queue_len(&self) -> usize {
        self.state.pipeline.queue().len()
    }
}

/// Build a test `ServerConfig` with fast polling.
pub fn test_config(max_queue: usize) -> ServerConfig {
    let max_queue = max_queue.to_string();
    ServerConfig::try_parse_from([
        "imagegate-api",
        "--host",
        "127.0.0.1",
        "--comfyui-path",
        "/opt/ComfyUI",
        "--max-queue",
        max_queue.as_str(),
        "--poll-interval-ms",
        "10",
        "--poll-attempts",
        "5",
    ])
    .expect("valid test config")
}

/// Build the full application router with all middleware layers over a
/// fake backend.
pub fn build_test_app(backend: Backend, max_queue: usize) -> TestApp {
    build_test_app_with_delay(backend, max_queue, Duration::ZERO)
}

pub fn build_test_app_with_delay(backend: Backend, max_queue: usize, delay: Duration) -> TestApp {
    let output = tempfile::tempdir().expect("create output dir");
    let config = test_config(max_queue);

    let runner = Arc::new(FakeRunner {
        output_dir: output.path().to_path_buf(),
        backend,
        delay,
        gate: Semaphore::new(0),
        calls: AtomicUsize::new(0),
        spans: Mutex::new(Vec::new()),
        workflows: Mutex::new(Vec::new()),
    });

    let parts = PipelineParts {
        template: load_template(None, None).expect("bundled template"),
        schema: load_schema(None).expect("bundled schema"),
        checkpoint: Some("flux1-dev-fp8.safetensors".into()),
        runner: runner.clone(),
        output_dir: output.path().to_path_buf(),
    };
    let state = build_state(&config, parts);

    TestApp {
        router: build_app_router(state.clone()),
        state,
        runner,
        _output: output,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, &body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
