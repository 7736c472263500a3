//! Convolutional encoder: `1x64x64` image -> 4-element latent vector.

use super::onnx::{Feed, Input, LoadError, OnnxGraph};
use super::InferenceError;
use crate::preprocess::{ImageTensor, IMAGE_SIZE};
use ndarray::Array1;
use tract_onnx::pb::ModelProto;

pub const LATENT_DIM: usize = 4;
const IMAGE_SHAPE: [usize; 4] = [1, 1, IMAGE_SIZE, IMAGE_SIZE];

#[derive(Debug)]
pub struct Encoder {
    graph: OnnxGraph,
}

impl Encoder {
    /// Graph input 0 is the normalised image; output 0 the `[1, 4]` latent.
    pub fn from_proto(name: &str, proto: &ModelProto) -> Result<Self, LoadError> {
        Ok(Self { graph: OnnxGraph::from_proto(name, proto, &[Input::F32(&IMAGE_SHAPE)])? })
    }

    pub fn forward(&self, image: &ImageTensor) -> Result<Array1<f32>, InferenceError> {
        let pixels = image.as_slice().ok_or_else(|| InferenceError::Internal("image tensor is not contiguous".into()))?;
        let (shape, latent) = self.graph.run(&[Feed::F32(&IMAGE_SHAPE, pixels)])?;
        if latent.len() != LATENT_DIM {
            return Err(InferenceError::shape("encoder output", vec![1, LATENT_DIM], shape));
        }
        Ok(Array1::from(latent))
    }
}
