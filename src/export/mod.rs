//! ONNX export of a trained classifier.
//!
//! The graph mirrors [`Classifier::forward`] in inference mode (batch norm on
//! running statistics, dropout removed). It declares one input named
//! [`INPUT_NAME`] of shape `[batch_size, 1, mel_bins, frames]` and one output
//! named [`OUTPUT_NAME`] of shape `[batch_size, num_classes]`; the batch
//! dimension is symbolic.

mod proto;

use std::fs;
use std::path::{Path, PathBuf};

use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Linear};
use burn::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::config::FeatureConfig;
use crate::model::{CONV_CHANNELS, Classifier, ConvBlock, HIDDEN_UNITS};
use proto::Message;

pub const INPUT_NAME: &str = "input";
pub const OUTPUT_NAME: &str = "output";
pub const BATCH_DIM: &str = "batch_size";
pub const IR_VERSION: i64 = 6;
pub const OPSET_VERSION: i64 = 11;

// ONNX enum values.
const TENSOR_FLOAT: i64 = 1;
const ATTR_FLOAT: i64 = 1;
const ATTR_INT: i64 = 2;
const ATTR_INTS: i64 = 7;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write ONNX model {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read parameter {name}: {detail}")]
    Tensor { name: String, detail: String },
    #[error("Unexpected layout for {name}: {detail}")]
    Layout { name: String, detail: String },
}

/// Serialize `model` as an ONNX file at `path`.
pub fn export_onnx<B: Backend>(
    model: &Classifier<B>,
    features: &FeatureConfig,
    path: &Path,
) -> Result<(), ExportError> {
    let bytes = encode_model(model, features.mel_bins, features.frames)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, &bytes).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        "Exported ONNX model ({} bytes, opset {OPSET_VERSION}) to {}",
        bytes.len(),
        path.display()
    );
    Ok(())
}

/// Encoded `ModelProto` bytes for `model`.
pub fn encode_model<B: Backend>(
    model: &Classifier<B>,
    mel_bins: usize,
    frames: usize,
) -> Result<Vec<u8>, ExportError> {
    let mut graph = GraphBuilder::default();
    let x = graph.conv_block("block1", &model.block1, INPUT_NAME)?;
    let x = graph.max_pool("pool1", &x);
    let x = graph.conv_block("block2", &model.block2, &x)?;
    let x = graph.max_pool("pool2", &x);
    let x = graph.conv_block("block3", &model.block3, &x)?;
    let x = graph.node("GlobalAveragePool", "global_pool", &[&x], Vec::new());
    let x = graph.node("Flatten", "flatten", &[&x], vec![attr_int("axis", 1)]);
    let x = graph.gemm("fc1", &model.fc1, &x, CONV_CHANNELS[3], HIDDEN_UNITS)?;
    let x = graph.node("Relu", "fc1_relu", &[&x], Vec::new());
    let logits = graph.gemm("fc2", &model.fc2, &x, HIDDEN_UNITS, model.num_classes())?;

    let input_info = value_info(
        INPUT_NAME,
        &[
            Dim::Param(BATCH_DIM),
            Dim::Value(1),
            Dim::Value(mel_bins),
            Dim::Value(frames),
        ],
    );
    let output_info = value_info(
        OUTPUT_NAME,
        &[Dim::Param(BATCH_DIM), Dim::Value(model.num_classes())],
    );
    let graph = graph.finish(&logits, input_info, output_info);

    let opset = Message::new().string(1, "").int64(2, OPSET_VERSION);
    Ok(Message::new()
        .int64(1, IR_VERSION)
        .string(2, env!("CARGO_PKG_NAME"))
        .string(3, env!("CARGO_PKG_VERSION"))
        .message(7, graph)
        .message(8, opset)
        .into_bytes())
}

struct NodeSpec {
    op: String,
    name: String,
    inputs: Vec<String>,
    output: String,
    attrs: Vec<Message>,
}

#[derive(Default)]
struct GraphBuilder {
    nodes: Vec<NodeSpec>,
    initializers: Vec<Message>,
}

impl GraphBuilder {
    /// Append a single-output node; returns the output value name.
    fn node(&mut self, op: &str, name: &str, inputs: &[&str], attrs: Vec<Message>) -> String {
        let output = format!("{name}_out");
        self.nodes.push(NodeSpec {
            op: op.to_string(),
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output: output.clone(),
            attrs,
        });
        output
    }

    fn initializer<B: Backend, const D: usize>(
        &mut self,
        name: &str,
        tensor: Tensor<B, D>,
    ) -> Result<String, ExportError> {
        let dims: Vec<i64> = tensor.dims().iter().map(|&d| d as i64).collect();
        let values = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| ExportError::Tensor {
                name: name.to_string(),
                detail: format!("{err:?}"),
            })?;
        self.push_initializer(name, &dims, &values);
        Ok(name.to_string())
    }

    fn push_initializer(&mut self, name: &str, dims: &[i64], values: &[f32]) {
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.initializers.push(
            Message::new()
                .int64s(1, dims)
                .int64(2, TENSOR_FLOAT)
                .string(8, name)
                .bytes(9, &raw),
        );
    }

    fn conv_block<B: Backend>(
        &mut self,
        name: &str,
        block: &ConvBlock<B>,
        input: &str,
    ) -> Result<String, ExportError> {
        let x = self.conv(&format!("{name}_conv"), &block.conv, input)?;
        let x = self.batch_norm(&format!("{name}_bn"), &block.norm, &x)?;
        Ok(self.node("Relu", &format!("{name}_relu"), &[&x], Vec::new()))
    }

    fn conv<B: Backend>(
        &mut self,
        name: &str,
        conv: &Conv2d<B>,
        input: &str,
    ) -> Result<String, ExportError> {
        let weight = conv.weight.val();
        let [out_channels, _, kh, kw] = weight.dims();
        let w = self.initializer(&format!("{name}.weight"), weight)?;
        let b = match &conv.bias {
            Some(bias) => self.initializer(&format!("{name}.bias"), bias.val())?,
            None => {
                let bias_name = format!("{name}.bias");
                self.push_initializer(&bias_name, &[out_channels as i64], &vec![0.0; out_channels]);
                bias_name
            }
        };
        let attrs = vec![
            attr_ints("kernel_shape", &[kh as i64, kw as i64]),
            attr_ints("pads", &[1, 1, 1, 1]),
            attr_ints("strides", &[1, 1]),
            attr_ints("dilations", &[1, 1]),
            attr_int("group", 1),
        ];
        Ok(self.node("Conv", name, &[input, &w, &b], attrs))
    }

    fn batch_norm<B: Backend>(
        &mut self,
        name: &str,
        norm: &BatchNorm<B>,
        input: &str,
    ) -> Result<String, ExportError> {
        let scale = self.initializer(&format!("{name}.scale"), norm.gamma.val())?;
        let bias = self.initializer(&format!("{name}.bias"), norm.beta.val())?;
        let mean = self.initializer(&format!("{name}.mean"), norm.running_mean.value())?;
        let var = self.initializer(&format!("{name}.var"), norm.running_var.value())?;
        let attrs = vec![attr_float("epsilon", norm.epsilon as f32)];
        Ok(self.node(
            "BatchNormalization",
            name,
            &[input, &scale, &bias, &mean, &var],
            attrs,
        ))
    }

    fn max_pool(&mut self, name: &str, input: &str) -> String {
        let attrs = vec![
            attr_ints("kernel_shape", &[2, 2]),
            attr_ints("strides", &[2, 2]),
        ];
        self.node("MaxPool", name, &[input], attrs)
    }

    /// `Gemm` for a burn `Linear`, whose weight is stored `[d_input, d_output]`.
    fn gemm<B: Backend>(
        &mut self,
        name: &str,
        linear: &Linear<B>,
        input: &str,
        d_input: usize,
        d_output: usize,
    ) -> Result<String, ExportError> {
        let weight = linear.weight.val();
        let trans_b = match weight.dims() {
            [i, o] if i == d_input && o == d_output => 0,
            [o, i] if i == d_input && o == d_output => 1,
            dims => {
                return Err(ExportError::Layout {
                    name: format!("{name}.weight"),
                    detail: format!("shape {dims:?} for {d_input} -> {d_output}"),
                });
            }
        };
        let w = self.initializer(&format!("{name}.weight"), weight)?;
        let b = match &linear.bias {
            Some(bias) => self.initializer(&format!("{name}.bias"), bias.val())?,
            None => {
                let bias_name = format!("{name}.bias");
                self.push_initializer(&bias_name, &[d_output as i64], &vec![0.0; d_output]);
                bias_name
            }
        };
        let attrs = vec![
            attr_float("alpha", 1.0),
            attr_float("beta", 1.0),
            attr_int("transB", trans_b),
        ];
        Ok(self.node("Gemm", name, &[input, &w, &b], attrs))
    }

    /// Assemble the `GraphProto`, renaming `last` to the public output name.
    fn finish(self, last: &str, input: Message, output: Message) -> Message {
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| {
                let out = if node.output == last {
                    OUTPUT_NAME
                } else {
                    node.output.as_str()
                };
                node.inputs
                    .iter()
                    .fold(Message::new(), |msg, name| msg.string(1, name))
                    .string(2, out)
                    .string(3, &node.name)
                    .string(4, &node.op)
                    .messages(5, node.attrs)
            })
            .collect();
        Message::new()
            .messages(1, nodes)
            .string(2, "voxmood_classifier")
            .messages(5, self.initializers)
            .message(11, input)
            .message(12, output)
    }
}

enum Dim<'a> {
    Value(usize),
    Param(&'a str),
}

fn value_info(name: &str, dims: &[Dim<'_>]) -> Message {
    let shape = dims.iter().fold(Message::new(), |shape, dim| {
        let dim = match dim {
            Dim::Value(v) => Message::new().int64(1, *v as i64),
            Dim::Param(p) => Message::new().string(2, p),
        };
        shape.message(1, dim)
    });
    let tensor_type = Message::new()
        .int64(1, TENSOR_FLOAT)
        .message(2, shape);
    Message::new()
        .string(1, name)
        .message(2, Message::new().message(1, tensor_type))
}

fn attr_int(name: &str, value: i64) -> Message {
    Message::new()
        .string(1, name)
        .int64(3, value)
        .int64(20, ATTR_INT)
}

fn attr_ints(name: &str, values: &[i64]) -> Message {
    Message::new()
        .string(1, name)
        .int64s(8, values)
        .int64(20, ATTR_INTS)
}

fn attr_float(name: &str, value: f32) -> Message {
    Message::new()
        .string(1, name)
        .float(2, value)
        .int64(20, ATTR_FLOAT)
}
