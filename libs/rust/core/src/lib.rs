//! Core shared utilities for Defectron services.
//!
//! Tracing setup, layered configuration, process health flags and the
//! health/metrics HTTP server live here so every service binary wires them
//! the same way.

use anyhow::Result;
use axum::{http::{header, StatusCode}, response::IntoResponse, routing::get, Router};
use once_cell::sync::OnceCell;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub use config::{load_config, load_config_from, ConfigSources};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static SERVICE_NAME: OnceCell<String> = OnceCell::new();
static NODE_LIVENESS: AtomicBool = AtomicBool::new(true);
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }
pub fn mark_not_live() { NODE_LIVENESS.store(false, Ordering::SeqCst); }
pub fn is_ready() -> bool { NODE_READINESS.load(Ordering::SeqCst) }
pub fn is_live() -> bool { NODE_LIVENESS.load(Ordering::SeqCst) }

/// Installs the global `tracing` subscriber once per process.
///
/// `RUST_LOG` wins over `default_level`. Set `DEFECTRON_JSON_LOG=1` for
/// flattened JSON lines instead of the human-readable format.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("DEFECTRON_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
        let json_layer = json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
        });
        let text_layer = (!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
        });
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    let _ = SERVICE_NAME.set(service.to_string());
    info!(target: "defectron_core", service, "tracing initialized");
    Ok(())
}

/// Router serving `/live`, `/ready`, `/status` and `/metrics`.
pub fn health_router() -> Router {
    Router::new()
        .route("/live", get(|| async { axum::Json(serde_json::json!({"live": is_live()})) }))
        .route("/ready", get(|| async {
            let ready = is_ready();
            let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
            (status, axum::Json(serde_json::json!({"ready": ready})))
        }))
        .route("/status", get(|| async {
            axum::Json(serde_json::json!({
                "service": SERVICE_NAME.get().cloned(),
                "live": is_live(),
                "ready": is_ready(),
            }))
        }))
        .route("/metrics", get(metrics_handler))
}

/// Binds the health server and serves it in the background. Returns the bound
/// address, which matters when `port` is 0.
pub async fn start_health_server(port: u16) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    let addr = listener.local_addr()?;
    tracing::info!(?addr, "Health server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router()).await {
            tracing::error!(error=?e, "Health server failed");
        }
    });
    Ok(addr)
}

async fn metrics_handler() -> axum::response::Response {
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buf).into_response()
}

/// Resolves on Ctrl-C or SIGTERM and flips the process to not-live/not-ready.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await { tracing::warn!(error=?e, "ctrl-c handler failed"); }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => { tracing::warn!(error=?e, "SIGTERM handler failed"); std::future::pending::<()>().await; }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    clear_ready();
    mark_not_live();
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_server_reports_readiness() {
        let addr = start_health_server(0).await.unwrap();
        let base = format!("http://127.0.0.1:{}", addr.port());
        let client = reqwest::Client::new();

        clear_ready();
        let resp = client.get(format!("{base}/ready")).send().await.unwrap();
        assert_eq!(resp.status(), 503);

        mark_ready();
        let body: serde_json::Value = client.get(format!("{base}/ready")).send().await.unwrap().json().await.unwrap();
        assert_eq!(body["ready"], true);

        let live: serde_json::Value = client.get(format!("{base}/live")).send().await.unwrap().json().await.unwrap();
        assert_eq!(live["live"], true);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text_format() {
        let counter = prometheus::register_int_counter!("defectron_core_test_total", "test counter").unwrap();
        counter.inc();
        let addr = start_health_server(0).await.unwrap();
        let body = reqwest::get(format!("http://127.0.0.1:{}/metrics", addr.port())).await.unwrap().text().await.unwrap();
        assert!(body.contains("defectron_core_test_total 1"));
    }
}
