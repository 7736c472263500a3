#![allow(dead_code)]

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use inference_gateway::config::GatewayConfig;
use inference_gateway::http::router;
use inference_gateway::model::synthetic::{self, Fill};
use inference_gateway::pipeline::Pipeline;
use inference_gateway::registry::ClassRegistry;
use inference_gateway::state_with_pipeline;
use std::io::Cursor;
use tempfile::TempDir;

pub struct Gateway {
    pub base: String,
    _artifacts: TempDir,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }
}

/// Starts the real router on an ephemeral port over synthetic all-zero
/// graphs: every reconstruction is flat mid-gray. The class table is read
/// from files the same way startup reads it.
pub async fn spawn_gateway(example_image_url: &str, max_upload_bytes: usize) -> Gateway {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("class_to_idx.json"), r#"{"bottle": 0, "cable": 1}"#).unwrap();
    std::fs::write(dir.path().join("thresholds.json"), r#"{"0": 0.05, "1": 0.05}"#).unwrap();

    let mut cfg = GatewayConfig::default();
    cfg.artifacts.dir = dir.path().to_path_buf();
    cfg.example_image.url = example_image_url.to_string();
    cfg.example_image.timeout_secs = Some(5);
    let registry = ClassRegistry::load(&cfg.artifacts.class_map_path(), &cfg.artifacts.thresholds_path()).unwrap();
    let (encoder, generator) = synthetic::models(registry.len(), Fill::Zeros).unwrap();
    let state = state_with_pipeline(Pipeline::new(encoder, generator, registry).unwrap(), &cfg).unwrap();
    let base = serve(router(state, max_upload_bytes)).await;
    Gateway { base, _artifacts: dir }
}

/// Serves `app` on an ephemeral port and returns its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

pub fn gray_png(value: u8, side: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(GrayImage::from_pixel(side, side, Luma([value])))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
