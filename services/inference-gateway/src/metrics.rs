//! Prometheus instruments, registered in the default registry so the core
//! health server's `/metrics` exposes them.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

pub struct GatewayMetrics {
    /// `result` = `normal` | `anomaly`.
    pub predictions: IntCounterVec,
    /// `kind` = `bad_request` | `unknown_class` | `decode` | `internal`.
    pub prediction_errors: IntCounterVec,
    pub stage_latency_ms: HistogramVec,
    /// `outcome` = `ok` | `error`.
    pub example_image_fetches: IntCounterVec,
}

static METRICS: Lazy<GatewayMetrics> = Lazy::new(|| GatewayMetrics {
    predictions: register_int_counter_vec!("defectron_predictions_total", "Completed predictions by verdict", &["result"])
        .expect("register defectron_predictions_total"),
    prediction_errors: register_int_counter_vec!("defectron_prediction_errors_total", "Failed prediction requests by error kind", &["kind"])
        .expect("register defectron_prediction_errors_total"),
    stage_latency_ms: register_histogram_vec!(
        "defectron_stage_latency_ms",
        "Prediction stage latency in milliseconds",
        &["stage"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    )
    .expect("register defectron_stage_latency_ms"),
    example_image_fetches: register_int_counter_vec!("defectron_example_image_fetch_total", "Example image fetches by outcome", &["outcome"])
        .expect("register defectron_example_image_fetch_total"),
});

pub fn metrics() -> &'static GatewayMetrics { &METRICS }

pub fn observe_stage(stage: &str, ms: f64) { METRICS.stage_latency_ms.with_label_values(&[stage]).observe(ms); }
