use crate::metrics::{metrics, observe_stage};
use crate::model::{Encoder, Generator, InferenceError};
use crate::preprocess::{preprocess, ImageTensor, PreprocessError, IMAGE_SIZE};
use crate::registry::{ClassRegistry, UnknownClass};
use crate::render::{encode_png_base64, RenderError};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    UnknownClass(#[from] UnknownClass),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("no threshold registered for class index {0}")]
    MissingThreshold(usize),
}

impl PredictError {
    /// Label for `defectron_prediction_errors_total`.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::UnknownClass(_) => "unknown_class",
            PredictError::Preprocess(_) => "decode",
            PredictError::Inference(_) | PredictError::Render(_) | PredictError::MissingThreshold(_) => "internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict { Normal, Anomaly }

impl Verdict {
    /// Strictly greater than the threshold is an anomaly.
    pub fn from_score(score: f64, threshold: f64) -> Self { if score > threshold { Verdict::Anomaly } else { Verdict::Normal } }

    pub fn as_str(self) -> &'static str {
        match self { Verdict::Normal => "normal", Verdict::Anomaly => "anomaly" }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageLatencies { pub preprocess_ms: f64, pub encode_ms: f64, pub generate_ms: f64, pub render_ms: f64, pub total_ms: f64 }

/// Forward-pass output for one image.
#[derive(Debug, Clone)]
pub struct Inference {
    pub reconstruction: ImageTensor,
    pub anomaly_map: ImageTensor,
    pub score: f64,
}

/// Body of a successful `/predict` response.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    #[serde(skip)]
    pub class_index: usize,
    pub score: f64,
    pub threshold: f64,
    #[serde(rename = "result")]
    pub label: Verdict,
    pub reconstructed_image: String,
    pub anomaly_map: String,
    #[serde(skip)]
    pub latency_ms: StageLatencies,
}

/// Loaded models plus class table. Immutable once built; share via `Arc`.
pub struct Pipeline {
    encoder: Encoder,
    generator: Generator,
    registry: ClassRegistry,
}

impl Pipeline {
    pub fn new(encoder: Encoder, generator: Generator, registry: ClassRegistry) -> Result<Self, InferenceError> {
        if generator.num_classes() != registry.len() {
            return Err(InferenceError::shape("class table", vec![registry.len()], vec![generator.num_classes()]));
        }
        Ok(Self { encoder, generator, registry })
    }

    pub fn registry(&self) -> &ClassRegistry { &self.registry }

    /// Encoder -> generator -> reconstruction error.
    pub fn run(&self, class_index: usize, image: &ImageTensor) -> Result<Inference, InferenceError> {
        self.forward(class_index, image, &mut StageLatencies::default())
    }

    fn forward(&self, class_index: usize, image: &ImageTensor, lat: &mut StageLatencies) -> Result<Inference, InferenceError> {
        let s = Instant::now();
        let latent = self.encoder.forward(image)?;
        lat.encode_ms = elapsed_ms(s);

        let s = Instant::now();
        let reconstruction = self.generator.forward(latent.view(), class_index)?;
        lat.generate_ms = elapsed_ms(s);

        let (anomaly_map, score) = score_reconstruction(image, &reconstruction)?;
        Ok(Inference { reconstruction, anomaly_map, score })
    }

    /// The image is decoded before the class is resolved, so a request with
    /// both a bad image and a bad class reports the decode failure.
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    pub fn predict(&self, class_name: &str, image_bytes: &[u8]) -> Result<Prediction, PredictError> {
        let start = Instant::now();
        let mut lat = StageLatencies::default();

        let s = Instant::now();
        let image = preprocess(image_bytes)?;
        lat.preprocess_ms = elapsed_ms(s);

        let class_index = self.registry.index_of(class_name)?;
        let threshold = self.registry.threshold(class_index).ok_or(PredictError::MissingThreshold(class_index))?;
        let out = self.forward(class_index, &image, &mut lat)?;
        let label = Verdict::from_score(out.score, threshold);

        let s = Instant::now();
        let reconstructed_image = encode_png_base64(out.reconstruction.view().into_dyn())?;
        let anomaly_map = encode_png_base64(out.anomaly_map.view().into_dyn())?;
        lat.render_ms = elapsed_ms(s);
        lat.total_ms = elapsed_ms(start);

        for (stage, ms) in [("preprocess", lat.preprocess_ms), ("encode", lat.encode_ms), ("generate", lat.generate_ms), ("render", lat.render_ms), ("total", lat.total_ms)] {
            observe_stage(stage, ms);
        }
        metrics().predictions.with_label_values(&[label.as_str()]).inc();
        debug!(class_index, score = out.score, threshold, result = label.as_str(), latency = ?lat, "prediction complete");

        Ok(Prediction { class_index, score: out.score, threshold, label, reconstructed_image, anomaly_map, latency_ms: lat })
    }

    /// One throwaway forward pass so the first request does not pay for
    /// first-touch allocations.
    pub fn warmup(&self) -> Result<(), InferenceError> {
        let start = Instant::now();
        let image = ImageTensor::zeros((1, IMAGE_SIZE, IMAGE_SIZE));
        let out = self.run(0, &image)?;
        info!(elapsed_ms = elapsed_ms(start), score = out.score, "pipeline warm-up complete");
        Ok(())
    }
}

fn elapsed_ms(since: Instant) -> f64 { since.elapsed().as_secs_f64() * 1000.0 }

/// Per-pixel absolute error and mean squared error between an input and its
/// reconstruction.
pub fn score_reconstruction(input: &ImageTensor, reconstruction: &ImageTensor) -> Result<(ImageTensor, f64), InferenceError> {
    if input.dim() != reconstruction.dim() {
        return Err(InferenceError::shape("reconstruction", input.shape().to_vec(), reconstruction.shape().to_vec()));
    }
    let diff = input - reconstruction;
    let score = diff.iter().map(|d| f64::from(*d).powi(2)).sum::<f64>() / diff.len() as f64;
    Ok((diff.mapv(f32::abs), score))
}
