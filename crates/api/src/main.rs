use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagegate_api::config::ServerConfig;
use imagegate_api::router::build_app_router;
use imagegate_api::startup::{self, PipelineParts};
use imagegate_comfyui::api::ComfyUIApi;
use imagegate_comfyui::model_paths::ModelPaths;
use imagegate_comfyui::process::ComfyProcess;
use imagegate_comfyui::runner::ComfyCli;
use imagegate_comfyui::settings::ComfySettings;

/// Delay between readiness probes after launch.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "imagegate_api=debug,imagegate_pipeline=debug,imagegate_comfyui=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::parse();

    if let Err(e) = run(config).await {
        tracing::error!("Server failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.host,
        port = config.port,
        comfyui_path = %config.comfyui_path.display(),
        max_queue = config.max_queue,
        "Loaded server configuration",
    );

    // --- Request schema and workflow template ---
    let schema = startup::load_schema(config.schema.as_deref())?;
    let template =
        startup::load_template(config.workflow.as_deref(), config.workflow_slots.as_deref())?;
    tracing::info!(workflow = template.name(), "Workflow template loaded");

    // --- Output directory ---
    // The guard removes a generated directory when `run` returns.
    let (output_dir, _output_guard) = startup::resolve_output_dir(config.output_path.as_deref())?;
    tracing::info!(output_dir = %output_dir.display(), "Output directory ready");

    // --- ComfyUI backend ---
    let model_paths = config
        .model_path
        .as_deref()
        .map(ModelPaths::for_checkpoint)
        .transpose()?;

    let (bin, bin_args) = ComfySettings::split_bin(&config.comfy_bin);
    let settings = ComfySettings {
        bin,
        bin_args,
        workspace: config.comfyui_path.clone(),
        host: config.comfy_host.clone(),
        port: config.comfy_port,
        output_dir: output_dir.clone(),
    };

    let comfy_process = ComfyProcess::start(settings.clone(), model_paths).await?;

    if let Some(timeout) = config.ready_timeout() {
        let api = ComfyUIApi::new(settings.api_url());
        if !api.wait_until_ready(timeout, READY_POLL_INTERVAL).await {
            tracing::warn!(
                api_url = %settings.api_url(),
                timeout_secs = timeout.as_secs(),
                "ComfyUI did not answer in time; serving anyway",
            );
        }
    }

    // --- App state ---
    let parts = PipelineParts {
        template,
        schema,
        checkpoint: comfy_process.checkpoint_name().map(str::to_string),
        runner: Arc::new(ComfyCli::new(settings, config.run_timeout())),
        output_dir,
    };
    let state = startup::build_state(&config, parts);
    let app = build_app_router(state);

    // --- Start server ---
    let served = serve(&config, app).await;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, stopping ComfyUI");
    comfy_process.stop().await;
    tracing::info!("Graceful shutdown complete");

    served
}

async fn serve(config: &ServerConfig, app: axum::Router) -> anyhow::Result<()> {
    let addr = SocketAddr::new(
        config
            .host
            .parse()
            .with_context(|| format!("invalid HOST address '{}'", config.host))?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
