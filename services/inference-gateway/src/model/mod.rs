//! Pre-trained encoder and hybrid generator, evaluated forward-only.
//!
//! Every forward method takes `&self`: loaded plans are never mutated, so one
//! loaded model is shared by all concurrent requests.

pub mod encoder;
pub mod generator;
pub mod onnx;
pub mod quantum;
pub mod synthetic;

pub use encoder::{Encoder, LATENT_DIM};
pub use generator::{Generator, QUANTUM_LAYERS};
pub use onnx::{Artifact, LoadError};

use ndarray::Array3;
use ndarray_npy::ReadNpyExt;
use thiserror::Error;
use tracing::info;

/// Internal inconsistency between pipeline stages. Never caused by request
/// content, so it maps to a server error.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("shape mismatch at {stage}: expected {expected:?}, got {found:?}")]
    Shape { stage: &'static str, expected: Vec<usize>, found: Vec<usize> },
    #[error("class index {index} outside the generator's {classes} classes")]
    ClassOutOfRange { index: usize, classes: usize },
    #[error("{graph} failed: {message}")]
    Runtime { graph: String, message: String },
    #[error("internal inference error: {0}")]
    Internal(String),
}

impl InferenceError {
    pub(crate) fn shape(stage: &'static str, expected: Vec<usize>, found: Vec<usize>) -> Self {
        Self::Shape { stage, expected, found }
    }
}

/// The four files that make up a trained model pair.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub encoder: Artifact,
    pub generator_pre: Artifact,
    pub quantum_weights: Artifact,
    pub generator_post: Artifact,
}

/// `q_layer.weights` as a `[layers, 4, 3]` float32 `.npy`.
pub fn read_quantum_weights(artifact: &Artifact) -> Result<Array3<f32>, LoadError> {
    let bytes = artifact.read()?;
    Array3::<f32>::read_npy(bytes.as_slice()).map_err(|e| LoadError::Format { path: artifact.path.clone(), message: e.to_string() })
}

/// Loads both models. `num_classes` must match the generator's embedding table.
pub fn load_models(files: &ModelFiles, num_classes: usize) -> Result<(Encoder, Generator), LoadError> {
    let encoder = Encoder::from_proto(&files.encoder.label(), &files.encoder.read_onnx()?)?;
    info!(path = %files.encoder.path.display(), "encoder loaded");

    let pre = files.generator_pre.read_onnx()?;
    let quantum = read_quantum_weights(&files.quantum_weights)?;
    let post = files.generator_post.read_onnx()?;
    let generator = Generator::from_protos((&files.generator_pre.label(), &pre), quantum, (&files.generator_post.label(), &post), num_classes)?;
    info!(
        pre = %files.generator_pre.path.display(),
        post = %files.generator_post.path.display(),
        num_classes,
        quantum_layers = generator.quantum_layers(),
        "generator loaded"
    );
    Ok((encoder, generator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{ImageTensor, IMAGE_SIZE};
    use synthetic::Fill;

    #[test]
    fn synthetic_models_run_end_to_end() {
        let (encoder, generator) = synthetic::models(3, Fill::Pattern { scale: 0.05 }).unwrap();
        assert_eq!(generator.num_classes(), 3);
        assert_eq!(generator.quantum_layers(), QUANTUM_LAYERS);

        let image = ImageTensor::from_elem((1, IMAGE_SIZE, IMAGE_SIZE), 0.25);
        let z = encoder.forward(&image).unwrap();
        assert_eq!(z.len(), LATENT_DIM);
        let recon = generator.forward(z.view(), 2).unwrap();
        assert_eq!(recon.dim(), (1, IMAGE_SIZE, IMAGE_SIZE));
        assert!(recon.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!(matches!(generator.forward(z.view(), 3), Err(InferenceError::ClassOutOfRange { index: 3, classes: 3 })));
    }

    #[test]
    fn latent_from_a_caller_buffer_feeds_the_generator() {
        let (_, generator) = synthetic::models(2, Fill::Zeros).unwrap();
        let owned = vec![0.1f32, -0.2, 0.3, -0.4];
        let recon = generator.forward(ndarray::ArrayView1::from(owned.as_slice()), 1).unwrap();
        assert!(recon.iter().all(|v| *v == 0.0));
        assert!(matches!(generator.forward(ndarray::ArrayView1::from(&owned[..3]), 0), Err(InferenceError::Shape { .. })));
    }

    #[test]
    fn class_count_mismatch_fails_fast() {
        let err = Generator::from_protos(
            ("pre", &synthetic::generator_pre(2, Fill::Zeros)),
            synthetic::quantum_weights(Fill::Zeros),
            ("post", &synthetic::generator_post(Fill::Zeros)),
            5,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Shape { ref name, .. } if name == "class_embedding.weight"), "{err}");
    }

    #[test]
    fn swapped_graphs_fail_fast() {
        let err = Generator::from_protos(
            ("encoder", &synthetic::encoder(Fill::Zeros)),
            synthetic::quantum_weights(Fill::Zeros),
            ("post", &synthetic::generator_post(Fill::Zeros)),
            2,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::MissingTensor { .. }), "{err}");
    }

    #[test]
    fn quantum_weights_load_from_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quantum_weights.npy");
        let weights = synthetic::quantum_weights(Fill::Pattern { scale: 0.5 });
        ndarray_npy::write_npy(&path, &weights).unwrap();
        assert_eq!(read_quantum_weights(&Artifact::new(&path)).unwrap(), weights);

        std::fs::write(&path, b"junk").unwrap();
        assert!(matches!(read_quantum_weights(&Artifact::new(&path)), Err(LoadError::Format { .. })));
    }

    #[test]
    fn missing_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let files = ModelFiles {
            encoder: Artifact::new(dir.path().join("encoder.onnx")),
            generator_pre: Artifact::new(dir.path().join("generator_pre.onnx")),
            quantum_weights: Artifact::new(dir.path().join("quantum_weights.npy")),
            generator_post: Artifact::new(dir.path().join("generator_post.onnx")),
        };
        assert!(matches!(load_models(&files, 1), Err(LoadError::Io { .. })));
    }
}
