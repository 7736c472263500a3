//! ONNX graphs run through tract, plus the integrity-checked artefact reads
//! every model file goes through.

use super::InferenceError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tract_onnx::pb::ModelProto;
use tract_onnx::prelude::*;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read model artefact {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("model artefact {path} hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { path: PathBuf, expected: String, actual: String },
    #[error("model artefact {path} is malformed: {message}")]
    Format { path: PathBuf, message: String },
    #[error("initializer {name:?} missing from {model}")]
    MissingTensor { model: String, name: String },
    #[error("tensor {name:?} in {model} has shape {found:?}, expected {expected:?}")]
    Shape { model: String, name: String, expected: Vec<usize>, found: Vec<usize> },
    #[error("tract rejected {model}: {message}")]
    Model { model: String, message: String },
}

/// One file on disk and the SHA-256 it must hash to, when pinned.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub sha256: Option<String>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into(), sha256: None } }

    pub fn pinned(path: impl Into<PathBuf>, sha256: Option<String>) -> Self { Self { path: path.into(), sha256 } }

    /// Reads the whole file, verifying the digest before anything parses it.
    pub fn read(&self) -> Result<Vec<u8>, LoadError> {
        let bytes = std::fs::read(&self.path).map_err(|source| LoadError::Io { path: self.path.clone(), source })?;
        if let Some(expected) = self.sha256.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            let actual = hex::encode(Sha256::digest(&bytes));
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(LoadError::HashMismatch { path: self.path.clone(), expected: expected.to_string(), actual });
            }
        }
        Ok(bytes)
    }

    /// Decodes the file as an ONNX `ModelProto`.
    pub fn read_onnx(&self) -> Result<ModelProto, LoadError> {
        let bytes = self.read()?;
        tract_onnx::onnx()
            .proto_model_for_read(&mut bytes.as_slice())
            .map_err(|e| LoadError::Format { path: self.path.clone(), message: format!("{e:#}") })
    }

    pub fn label(&self) -> String { self.path.display().to_string() }
}

/// Fixed input declared to the optimiser so every plan is fully concrete.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    F32(&'a [usize]),
    I64(&'a [usize]),
}

impl Input<'_> {
    fn fact(&self) -> InferenceFact {
        match self {
            Input::F32(shape) => f32::fact(shape.to_vec()).into(),
            Input::I64(shape) => i64::fact(shape.to_vec()).into(),
        }
    }
}

/// Request-time value for one graph input.
#[derive(Debug, Clone, Copy)]
pub enum Feed<'a> {
    F32(&'a [usize], &'a [f32]),
    I64(&'a [usize], &'a [i64]),
}

impl Feed<'_> {
    fn tensor(&self) -> TractResult<Tensor> {
        match *self {
            Feed::F32(shape, data) => Tensor::from_shape::<f32>(shape, data),
            Feed::I64(shape, data) => Tensor::from_shape::<i64>(shape, data),
        }
    }
}

/// Optimised, runnable graph. `run` takes `&self`, so one plan serves all
/// concurrent requests.
pub struct OnnxGraph {
    name: String,
    plan: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
}

impl fmt::Debug for OnnxGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("OnnxGraph").field("name", &self.name).finish() }
}

impl OnnxGraph {
    /// Pins `inputs` in declaration order, then optimises.
    pub fn from_proto(name: &str, proto: &ModelProto, inputs: &[Input<'_>]) -> Result<Self, LoadError> {
        let rejected = |e: TractError| LoadError::Model { model: name.to_string(), message: format!("{e:#}") };
        let mut model = tract_onnx::onnx().model_for_proto_model(proto).map_err(rejected)?;
        for (ix, input) in inputs.iter().enumerate() {
            model = model.with_input_fact(ix, input.fact()).map_err(rejected)?;
        }
        let plan = model.into_optimized().map_err(rejected)?.into_runnable().map_err(rejected)?;
        Ok(Self { name: name.to_string(), plan })
    }

    /// Runs the plan and returns the first output flattened, with its shape.
    pub fn run(&self, feeds: &[Feed<'_>]) -> Result<(Vec<usize>, Vec<f32>), InferenceError> {
        let failed = |e: TractError| InferenceError::Runtime { graph: self.name.clone(), message: format!("{e:#}") };
        let inputs = feeds.iter().map(|f| f.tensor().map(TValue::from)).collect::<TractResult<TVec<TValue>>>().map_err(failed)?;
        let outputs = self.plan.run(inputs).map_err(failed)?;
        let first = outputs.first().ok_or_else(|| InferenceError::Internal(format!("{} produced no outputs", self.name)))?;
        let view = first.to_array_view::<f32>().map_err(failed)?;
        Ok((view.shape().to_vec(), view.iter().copied().collect()))
    }
}

/// Dimensions of a named initializer, if the graph carries one.
pub fn initializer_dims(proto: &ModelProto, name: &str) -> Option<Vec<usize>> {
    let tensor = proto.graph.as_ref()?.initializer.iter().find(|t| t.name == name)?;
    tensor.dims.iter().map(|d| usize::try_from(*d).ok()).collect()
}
