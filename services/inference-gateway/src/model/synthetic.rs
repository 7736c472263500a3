//! Deterministic stand-in graphs with the same operators, tensor names and
//! shapes as the exported checkpoints. Used by tests, benches and local smoke
//! runs when the real artefacts are not at hand.

use super::encoder::{Encoder, LATENT_DIM};
use super::generator::{Generator, CLASS_EMBEDDING, EMBED_DIM, QUANTUM_LAYERS};
use super::onnx::LoadError;
use super::quantum::{N_QUBITS, ROT_PARAMS};
use crate::preprocess::{IMAGE_SIZE, PIXELS};
use ndarray::Array3;
use tract_onnx::pb::{
    self, attribute_proto::AttributeType, tensor_proto::DataType, tensor_shape_proto, type_proto, AttributeProto, ModelProto, NodeProto,
    TensorProto, ValueInfoProto,
};

const OPSET: i64 = 13;
const PRE_HIDDEN: usize = 128;
const POST_HIDDEN: usize = 512;

#[derive(Debug, Clone, Copy)]
pub enum Fill {
    /// Every parameter zero: the generator then reconstructs a flat mid-gray
    /// image regardless of input.
    Zeros,
    /// Bounded quasi-random values in `[-scale, scale]`.
    Pattern { scale: f32 },
}

impl Fill {
    fn values(self, len: usize, salt: usize) -> Vec<f32> {
        match self {
            Fill::Zeros => vec![0.0; len],
            Fill::Pattern { scale } => (0..len).map(|i| ((i as f32) * 0.618 + salt as f32).sin() * scale).collect(),
        }
    }
}

fn dims(shape: &[usize]) -> Vec<i64> { shape.iter().map(|d| *d as i64).collect() }

fn weights(fill: Fill, specs: &[(&str, Vec<usize>)]) -> Vec<TensorProto> {
    specs
        .iter()
        .enumerate()
        .map(|(salt, (name, shape))| TensorProto {
            name: name.to_string(),
            dims: dims(shape),
            data_type: DataType::Float as i32,
            float_data: fill.values(shape.iter().product(), salt),
            ..Default::default()
        })
        .collect()
}

fn int64_const(name: &str, values: &[i64]) -> TensorProto {
    TensorProto { name: name.into(), dims: vec![values.len() as i64], data_type: DataType::Int64 as i32, int64_data: values.to_vec(), ..Default::default() }
}

fn int_attr(name: &str, value: i64) -> AttributeProto {
    AttributeProto { name: name.into(), r#type: AttributeType::Int as i32, i: value, ..Default::default() }
}

fn ints_attr(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto { name: name.into(), r#type: AttributeType::Ints as i32, ints: values.to_vec(), ..Default::default() }
}

fn node(op_type: &str, inputs: &[&str], output: &str, attribute: Vec<AttributeProto>) -> NodeProto {
    NodeProto {
        name: output.into(),
        op_type: op_type.into(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: vec![output.into()],
        attribute,
        ..Default::default()
    }
}

fn value_info(name: &str, elem_type: DataType, shape: &[usize]) -> ValueInfoProto {
    let dim = shape
        .iter()
        .map(|d| tensor_shape_proto::Dimension { value: Some(tensor_shape_proto::dimension::Value::DimValue(*d as i64)), ..Default::default() })
        .collect();
    let tensor = type_proto::Tensor { elem_type: elem_type as i32, shape: Some(pb::TensorShapeProto { dim }), ..Default::default() };
    ValueInfoProto { name: name.into(), r#type: Some(pb::TypeProto { value: Some(type_proto::Value::TensorType(tensor)), ..Default::default() }), ..Default::default() }
}

fn model(name: &str, node: Vec<NodeProto>, initializer: Vec<TensorProto>, input: Vec<ValueInfoProto>, output: Vec<ValueInfoProto>) -> ModelProto {
    ModelProto {
        ir_version: 7,
        producer_name: "defectron-synthetic".into(),
        opset_import: vec![pb::OperatorSetIdProto { domain: String::new(), version: OPSET }],
        graph: Some(pb::GraphProto { name: name.into(), node, initializer, input, output, ..Default::default() }),
        ..Default::default()
    }
}

fn conv(input: &str, weight: &str, bias: &str, output: &str) -> NodeProto {
    node("Conv", &[input, weight, bias], output, vec![ints_attr("kernel_shape", &[4, 4]), ints_attr("strides", &[2, 2]), ints_attr("pads", &[1, 1, 1, 1])])
}

/// `nn.Linear` as exported: `Gemm` with the weight transposed.
fn linear(input: &str, prefix: &str, output: &str) -> NodeProto {
    let (w, b) = (format!("{prefix}.weight"), format!("{prefix}.bias"));
    node("Gemm", &[input, w.as_str(), b.as_str()], output, vec![int_attr("transB", 1)])
}

/// `image [1,1,64,64]` -> conv/relu x2 -> flatten -> `latent [1,4]`.
pub fn encoder(fill: Fill) -> ModelProto {
    let flat = 128 * (IMAGE_SIZE / 4) * (IMAGE_SIZE / 4);
    let initializer = weights(fill, &[
        ("conv1.weight", vec![64, 1, 4, 4]),
        ("conv1.bias", vec![64]),
        ("conv2.weight", vec![128, 64, 4, 4]),
        ("conv2.bias", vec![128]),
        ("fc.weight", vec![LATENT_DIM, flat]),
        ("fc.bias", vec![LATENT_DIM]),
    ]);
    let nodes = vec![
        conv("image", "conv1.weight", "conv1.bias", "conv1"),
        node("Relu", &["conv1"], "relu1", vec![]),
        conv("relu1", "conv2.weight", "conv2.bias", "conv2"),
        node("Relu", &["conv2"], "relu2", vec![]),
        node("Flatten", &["relu2"], "flat", vec![int_attr("axis", 1)]),
        linear("flat", "fc", "latent"),
    ];
    model(
        "encoder",
        nodes,
        initializer,
        vec![value_info("image", DataType::Float, &[1, 1, IMAGE_SIZE, IMAGE_SIZE])],
        vec![value_info("latent", DataType::Float, &[1, LATENT_DIM])],
    )
}

/// `(latent [1,4], label [1])` -> embedding lookup, concat, `pre_fc` -> `angles [1,4]`.
pub fn generator_pre(num_classes: usize, fill: Fill) -> ModelProto {
    let initializer = weights(fill, &[
        (CLASS_EMBEDDING, vec![num_classes, EMBED_DIM]),
        ("pre_fc.0.weight", vec![PRE_HIDDEN, LATENT_DIM + EMBED_DIM]),
        ("pre_fc.0.bias", vec![PRE_HIDDEN]),
        ("pre_fc.2.weight", vec![N_QUBITS, PRE_HIDDEN]),
        ("pre_fc.2.bias", vec![N_QUBITS]),
    ]);
    let nodes = vec![
        node("Gather", &[CLASS_EMBEDDING, "label"], "embedded", vec![int_attr("axis", 0)]),
        node("Concat", &["latent", "embedded"], "joined", vec![int_attr("axis", 1)]),
        linear("joined", "pre_fc.0", "hidden"),
        node("Relu", &["hidden"], "hidden_relu", vec![]),
        linear("hidden_relu", "pre_fc.2", "angles"),
    ];
    model(
        "generator_pre",
        nodes,
        initializer,
        vec![value_info("latent", DataType::Float, &[1, LATENT_DIM]), value_info("label", DataType::Int64, &[1])],
        vec![value_info("angles", DataType::Float, &[1, N_QUBITS])],
    )
}

/// `expectations [1,4]` -> `post_fc`, tanh -> `reconstruction [1,1,64,64]`.
pub fn generator_post(fill: Fill) -> ModelProto {
    let mut initializer = weights(fill, &[
        ("post_fc.0.weight", vec![POST_HIDDEN, N_QUBITS]),
        ("post_fc.0.bias", vec![POST_HIDDEN]),
        ("post_fc.2.weight", vec![PIXELS, POST_HIDDEN]),
        ("post_fc.2.bias", vec![PIXELS]),
    ]);
    initializer.push(int64_const("image_shape", &[1, 1, IMAGE_SIZE as i64, IMAGE_SIZE as i64]));
    let nodes = vec![
        linear("expectations", "post_fc.0", "hidden"),
        node("Relu", &["hidden"], "hidden_relu", vec![]),
        linear("hidden_relu", "post_fc.2", "pixels"),
        node("Tanh", &["pixels"], "pixels_tanh", vec![]),
        node("Reshape", &["pixels_tanh", "image_shape"], "reconstruction", vec![]),
    ];
    model(
        "generator_post",
        nodes,
        initializer,
        vec![value_info("expectations", DataType::Float, &[1, N_QUBITS])],
        vec![value_info("reconstruction", DataType::Float, &[1, 1, IMAGE_SIZE, IMAGE_SIZE])],
    )
}

pub fn quantum_weights(fill: Fill) -> Array3<f32> {
    let shape = (QUANTUM_LAYERS, N_QUBITS, ROT_PARAMS);
    Array3::from_shape_vec(shape, fill.values(QUANTUM_LAYERS * N_QUBITS * ROT_PARAMS, 7)).unwrap_or_else(|_| Array3::zeros(shape))
}

/// Built and optimised models over synthetic parameters.
pub fn models(num_classes: usize, fill: Fill) -> Result<(Encoder, Generator), LoadError> {
    let encoder = Encoder::from_proto("synthetic encoder", &encoder(fill))?;
    let generator = Generator::from_protos(
        ("synthetic generator_pre", &generator_pre(num_classes, fill)),
        quantum_weights(fill),
        ("synthetic generator_post", &generator_post(fill)),
        num_classes,
    )?;
    Ok((encoder, generator))
}
