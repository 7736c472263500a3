//! Defect-detection inference gateway.
//!
//! Startup loads the class registry and both models from the artefact
//! directory, warms the pipeline up, then serves the HTTP API alongside the
//! shared health/metrics server.

pub mod config;
pub mod http;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod registry;
pub mod render;

use anyhow::{Context, Result};
use crate::config::GatewayConfig;
use crate::http::AppState;
use crate::model::load_models;
use crate::pipeline::Pipeline;
use crate::registry::ClassRegistry;
use std::time::Duration;
use tracing::info;

/// Loads every startup artefact. Any failure here aborts startup.
pub fn build_state(cfg: &GatewayConfig) -> Result<AppState> {
    let artifacts = &cfg.artifacts;
    let registry = ClassRegistry::load(&artifacts.class_map_path(), &artifacts.thresholds_path()).context("loading class registry")?;
    let (encoder, generator) = load_models(&artifacts.model_files(), registry.len()).context("loading models")?;
    let pipeline = Pipeline::new(encoder, generator, registry).context("assembling pipeline")?;
    state_with_pipeline(pipeline, cfg)
}

/// Warms `pipeline` up and wraps it with the outbound HTTP client.
pub fn state_with_pipeline(pipeline: Pipeline, cfg: &GatewayConfig) -> Result<AppState> {
    pipeline.warmup().context("pipeline warm-up")?;

    let mut client = reqwest::Client::builder();
    if let Some(secs) = cfg.example_image.timeout_secs {
        client = client.timeout(Duration::from_secs(secs));
    }
    let client = client.build().context("building http client")?;
    Ok(AppState::new(pipeline, client, &cfg.example_image.url))
}

/// Serves the API until Ctrl-C / SIGTERM.
pub async fn run(cfg: GatewayConfig) -> Result<()> {
    let health_addr = defectron_core::start_health_server(cfg.server.health_port).await.context("starting health server")?;
    let state = build_state(&cfg)?;
    let app = crate::http::router(state, cfg.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind((cfg.server.host.as_str(), cfg.server.port))
        .await
        .with_context(|| format!("binding {}:{}", cfg.server.host, cfg.server.port))?;
    defectron_core::mark_ready();
    info!(addr = ?listener.local_addr().ok(), ?health_addr, "inference gateway listening");
    axum::serve(listener, app).with_graceful_shutdown(defectron_core::shutdown_signal()).await?;
    info!("inference gateway stopped");
    Ok(())
}
