use crate::model::{Artifact, ModelFiles};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "inference-gateway";

/// Public download link of the demo reference image.
pub const DEFAULT_EXAMPLE_IMAGE_URL: &str = "https://drive.google.com/uc?export=download&id=1HGKlmKbZJ6dY2zNib6sV9-TgSlIn_am4";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub service_name: String,
    pub log_level: String,
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub example_image: ExampleImageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub health_port: u16,
    pub max_upload_bytes: usize,
}

/// File locations of the startup artefacts. Relative names resolve against `dir`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
    pub encoder: PathBuf,
    pub generator_pre: PathBuf,
    pub quantum_weights: PathBuf,
    pub generator_post: PathBuf,
    pub class_map: PathBuf,
    pub thresholds: PathBuf,
    pub encoder_sha256: Option<String>,
    pub generator_pre_sha256: Option<String>,
    pub quantum_weights_sha256: Option<String>,
    pub generator_post_sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExampleImageConfig {
    pub url: String,
    /// Unset means the fetch may block for as long as the upstream does.
    pub timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.into(),
            log_level: "info".into(),
            server: ServerConfig::default(),
            artifacts: ArtifactsConfig::default(),
            example_image: ExampleImageConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self { Self { host: "0.0.0.0".into(), port: 5000, health_port: 9091, max_upload_bytes: 16 * 1024 * 1024 } }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
            encoder: PathBuf::from("encoder.onnx"),
            generator_pre: PathBuf::from("generator_pre.onnx"),
            quantum_weights: PathBuf::from("quantum_weights.npy"),
            generator_post: PathBuf::from("generator_post.onnx"),
            class_map: PathBuf::from("class_to_idx.json"),
            thresholds: PathBuf::from("thresholds.json"),
            encoder_sha256: None,
            generator_pre_sha256: None,
            quantum_weights_sha256: None,
            generator_post_sha256: None,
        }
    }
}

impl Default for ExampleImageConfig {
    fn default() -> Self { Self { url: DEFAULT_EXAMPLE_IMAGE_URL.into(), timeout_secs: None } }
}

impl GatewayConfig {
    pub fn load() -> anyhow::Result<Self> { defectron_core::load_config(SERVICE_NAME) }
}

impl ArtifactsConfig {
    fn resolve(&self, name: &Path) -> PathBuf { if name.is_absolute() { name.to_path_buf() } else { self.dir.join(name) } }
    pub fn encoder_path(&self) -> PathBuf { self.resolve(&self.encoder) }
    pub fn class_map_path(&self) -> PathBuf { self.resolve(&self.class_map) }
    pub fn thresholds_path(&self) -> PathBuf { self.resolve(&self.thresholds) }

    pub fn model_files(&self) -> ModelFiles {
        ModelFiles {
            encoder: Artifact::pinned(self.encoder_path(), self.encoder_sha256.clone()),
            generator_pre: Artifact::pinned(self.resolve(&self.generator_pre), self.generator_pre_sha256.clone()),
            quantum_weights: Artifact::pinned(self.resolve(&self.quantum_weights), self.quantum_weights_sha256.clone()),
            generator_post: Artifact::pinned(self.resolve(&self.generator_post), self.generator_post_sha256.clone()),
        }
    }
}
