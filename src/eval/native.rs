use std::path::Path;

use burn::prelude::*;

use super::{EvalError, InferenceBackend};
use crate::batch::Batch;
use crate::labels::LabelEncoding;
use crate::model::{self, Classifier};
use crate::train::checkpoint::{self, CheckpointError};

/// In-process inference with the burn classifier.
///
/// Use a non-autodiff backend so batch norm reads its running statistics and
/// dropout is the identity.
pub struct NativeBackend<B: Backend> {
    model: Classifier<B>,
    device: B::Device,
}

impl<B: Backend> NativeBackend<B> {
    pub fn new(model: Classifier<B>, device: B::Device) -> Self {
        Self { model, device }
    }

    /// Load the checkpoint for the classes of `labels`; absence is fatal.
    pub fn load(
        path: &Path,
        labels: &LabelEncoding,
        device: B::Device,
    ) -> Result<Self, CheckpointError> {
        let (model, _) = checkpoint::load::<B>(path, labels.classes(), &device)?;
        Ok(Self::new(model, device))
    }

    pub fn model(&self) -> &Classifier<B> {
        &self.model
    }
}

impl<B: Backend> InferenceBackend for NativeBackend<B> {
    fn name(&self) -> &'static str {
        "native"
    }

    fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    fn logits(&mut self, batch: &Batch) -> Result<Vec<f32>, EvalError> {
        let logits = self
            .model
            .forward(batch.features_tensor::<B>(&self.device));
        model::host_logits(logits).map_err(EvalError::Tensor)
    }
}
