//! Hybrid generator: latent vector + class label -> `1x64x64` reconstruction.
//!
//! The classical halves (`class_embedding` + `pre_fc`, then `post_fc`) are
//! ONNX graphs; the variational circuit between them runs natively.

use super::encoder::LATENT_DIM;
use super::onnx::{initializer_dims, Feed, Input, LoadError, OnnxGraph};
use super::quantum::{QuantumLayer, N_QUBITS};
use super::InferenceError;
use crate::preprocess::{ImageTensor, IMAGE_SIZE};
use ndarray::{Array3, ArrayView1};
use tract_onnx::pb::ModelProto;

pub const EMBED_DIM: usize = 4;
pub const QUANTUM_LAYERS: usize = 3;
/// Initializer whose row count fixes the number of classes.
pub const CLASS_EMBEDDING: &str = "class_embedding.weight";

const LATENT_SHAPE: [usize; 2] = [1, LATENT_DIM];
const LABEL_SHAPE: [usize; 1] = [1];
const QUANTUM_SHAPE: [usize; 2] = [1, N_QUBITS];

#[derive(Debug)]
pub struct Generator {
    pre: OnnxGraph,
    quantum: QuantumLayer,
    post: OnnxGraph,
    num_classes: usize,
}

impl Generator {
    /// `pre` takes `(latent [1, 4] f32, label [1] i64)` and yields the `[1, 4]`
    /// circuit angles; `post` maps `[1, 4]` expectations to the image.
    /// `num_classes` must equal the row count of `class_embedding.weight`.
    pub fn from_protos(pre: (&str, &ModelProto), quantum: Array3<f32>, post: (&str, &ModelProto), num_classes: usize) -> Result<Self, LoadError> {
        let (pre_name, pre_proto) = pre;
        let dims = initializer_dims(pre_proto, CLASS_EMBEDDING)
            .ok_or_else(|| LoadError::MissingTensor { model: pre_name.to_string(), name: CLASS_EMBEDDING.to_string() })?;
        if dims != [num_classes, EMBED_DIM] {
            return Err(LoadError::Shape { model: pre_name.to_string(), name: CLASS_EMBEDDING.to_string(), expected: vec![num_classes, EMBED_DIM], found: dims });
        }
        let quantum = QuantumLayer::new(quantum).map_err(|e| LoadError::Model { model: "quantum weights".into(), message: e.to_string() })?;
        let pre = OnnxGraph::from_proto(pre_name, pre_proto, &[Input::F32(&LATENT_SHAPE), Input::I64(&LABEL_SHAPE)])?;
        let post = OnnxGraph::from_proto(post.0, post.1, &[Input::F32(&QUANTUM_SHAPE)])?;
        Ok(Self { pre, quantum, post, num_classes })
    }

    pub fn num_classes(&self) -> usize { self.num_classes }

    pub fn quantum_layers(&self) -> usize { self.quantum.layers() }

    pub fn forward(&self, latent: ArrayView1<'_, f32>, class_index: usize) -> Result<ImageTensor, InferenceError> {
        if latent.len() != LATENT_DIM {
            return Err(InferenceError::shape("generator latent", vec![LATENT_DIM], vec![latent.len()]));
        }
        if class_index >= self.num_classes {
            return Err(InferenceError::ClassOutOfRange { index: class_index, classes: self.num_classes });
        }
        let latent = latent.to_vec();
        let label = [i64::try_from(class_index).map_err(|e| InferenceError::Internal(format!("class index: {e}")))?];
        let (shape, angles) = self.pre.run(&[Feed::F32(&LATENT_SHAPE, &latent), Feed::I64(&LABEL_SHAPE, &label)])?;
        if angles.len() != N_QUBITS {
            return Err(InferenceError::shape("pre_fc output", QUANTUM_SHAPE.to_vec(), shape));
        }
        let expectations = self.quantum.forward(ArrayView1::from(angles.as_slice()))?.to_vec();
        let (shape, pixels) = self.post.run(&[Feed::F32(&QUANTUM_SHAPE, &expectations)])?;
        ImageTensor::from_shape_vec((1, IMAGE_SIZE, IMAGE_SIZE), pixels).map_err(|_| InferenceError::shape("post_fc output", vec![1, 1, IMAGE_SIZE, IMAGE_SIZE], shape))
    }
}
