//! Convolutional emotion classifier.
//!
//! Three `Conv(3x3, pad 1) -> BatchNorm -> ReLU` stages (1 -> 32 -> 64 -> 128
//! channels), 2x max-pooling after the first two, adaptive average pooling to
//! 1x1 after the third, then `Linear(128, 64) -> ReLU -> Dropout(0.3) ->
//! Linear(64, num_classes)`. The output is raw logits.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    Relu,
};
use burn::prelude::*;

pub const CONV_CHANNELS: [usize; 4] = [1, 32, 64, 128];
pub const HIDDEN_UNITS: usize = 64;
pub const DROPOUT: f64 = 0.3;

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) norm: BatchNorm<B>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.activation.forward(self.norm.forward(self.conv.forward(input)))
    }
}

#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub(crate) block1: ConvBlock<B>,
    pool1: MaxPool2d,
    pub(crate) block2: ConvBlock<B>,
    pool2: MaxPool2d,
    pub(crate) block3: ConvBlock<B>,
    global_pool: AdaptiveAvgPool2d,
    pub(crate) fc1: Linear<B>,
    activation: Relu,
    dropout: Dropout,
    pub(crate) fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> Classifier<B> {
    /// Build a randomly initialized classifier for `num_classes` outputs.
    pub fn new(num_classes: usize, device: &B::Device) -> Self {
        let [c0, c1, c2, c3] = CONV_CHANNELS;
        Self {
            block1: ConvBlock::new(c0, c1, device),
            pool1: max_pool(),
            block2: ConvBlock::new(c1, c2, device),
            pool2: max_pool(),
            block3: ConvBlock::new(c2, c3, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(c3, HIDDEN_UNITS).init(device),
            activation: Relu::new(),
            dropout: DropoutConfig::new(DROPOUT).init(),
            fc2: LinearConfig::new(HIDDEN_UNITS, num_classes).init(device),
            num_classes,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `[batch, 1, mel_bins, frames]` -> `[batch, num_classes]` logits.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool1.forward(self.block1.forward(input));
        let x = self.pool2.forward(self.block2.forward(x));
        let x = self.global_pool.forward(self.block3.forward(x));
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.dropout.forward(self.activation.forward(self.fc1.forward(x)));
        self.fc2.forward(x)
    }
}

fn max_pool() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

/// Copy `[batch, classes]` logits to the host as row-major `f32`.
pub fn host_logits<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<f32>, String> {
    logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| format!("{err:?}"))
}

/// Index of the largest logit in each row of a row-major `[rows, classes]` buffer.
pub fn argmax_rows(logits: &[f32], classes: usize) -> Vec<usize> {
    if classes == 0 {
        return Vec::new();
    }
    logits
        .chunks_exact(classes)
        .map(|row| {
            let mut best = 0usize;
            let mut best_val = f32::NEG_INFINITY;
            for (idx, &value) in row.iter().enumerate() {
                if value > best_val {
                    best_val = value;
                    best = idx;
                }
            }
            best
        })
        .collect()
}
