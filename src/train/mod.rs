//! Epoch-based training driver.
//!
//! Each epoch: shuffled training batches with one AdamW step per batch, one
//! cosine schedule step, a gradient-free validation pass, then an
//! unconditional checkpoint write. A run resumes from the checkpoint sidecar
//! when one exists.

pub mod checkpoint;
pub mod schedule;

use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::config::PipelineConfig;
use crate::dataset::{self, AudioDataset, BatchLoader};
use crate::error::PipelineError;
use crate::features::{ExtractionStats, FeatureExtractor};
use crate::labels::LabelEncoding;
use crate::model::{self, Classifier};
use checkpoint::CheckpointMeta;
use schedule::CosineSchedule;

const PROGRESS_STEPS: usize = 10;

/// Metrics reported after each epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Sum of per-batch mean losses.
    pub train_loss: f32,
    /// Percent of training samples predicted correctly.
    pub train_accuracy: f32,
    /// Mean of per-batch validation losses, 0 for an empty split.
    pub val_loss: f32,
    pub val_accuracy: f32,
    /// Learning rate used for this epoch's optimizer steps.
    pub learning_rate: f64,
    pub extraction: ExtractionStats,
}

struct TrainState<B: AutodiffBackend> {
    model: Classifier<B>,
    start_epoch: usize,
    schedule: CosineSchedule,
}

#[derive(Default)]
struct PassTotals {
    loss_sum: f32,
    batches: usize,
    correct: usize,
    samples: usize,
}

impl PassTotals {
    fn accuracy(&self) -> f32 {
        if self.samples == 0 {
            0.0
        } else {
            self.correct as f32 / self.samples as f32 * 100.0
        }
    }

    fn mean_loss(&self) -> f32 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss_sum / self.batches as f32
        }
    }
}

pub struct Trainer<B: AutodiffBackend> {
    config: PipelineConfig,
    labels: LabelEncoding,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: &PipelineConfig, labels: LabelEncoding, device: B::Device) -> Self {
        Self {
            config: config.clone(),
            labels,
            device,
        }
    }

    /// Train over `train`, validating on `val` after every epoch.
    ///
    /// Returns the summaries of the epochs run by this call; a resumed run
    /// whose sidecar already records every epoch returns an empty list.
    pub fn fit(
        &self,
        train: &AudioDataset,
        val: &AudioDataset,
    ) -> Result<Vec<EpochSummary>, PipelineError> {
        if train.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let train_cfg = &self.config.train;
        let extractor = FeatureExtractor::new(&self.config.features);
        let loader = BatchLoader::new(&extractor, train_cfg.batch_size, train_cfg.num_workers)?;
        let TrainState {
            mut model,
            start_epoch,
            mut schedule,
        } = self.initial_state()?;

        let mut optim = AdamWConfig::new()
            .with_weight_decay(train_cfg.weight_decay)
            .init::<B, Classifier<B>>();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let val_loss_fn = CrossEntropyLossConfig::new().init(&self.device);

        info!(
            "Training {} samples ({} validation) for epochs {}..{} on {} classes",
            train.len(),
            val.len(),
            start_epoch + 1,
            train_cfg.epochs,
            self.labels.len()
        );

        let mut summaries = Vec::new();
        for epoch in start_epoch..train_cfg.epochs {
            let lr = schedule.lr();
            let mut rng = StdRng::seed_from_u64(train_cfg.seed.wrapping_add(epoch as u64));
            let order = dataset::epoch_order(train.len(), Some(&mut rng));

            let total_batches = loader.num_batches(train.len());
            let mut totals = PassTotals::default();
            for (batch_idx, batch) in loader.batches(train, order).enumerate() {
                let batch = batch?;
                if batch.is_empty() {
                    continue;
                }
                let (loss, correct) = forward_step(&model, &batch, &loss_fn, &self.device)?;
                let loss_value = loss.clone().into_scalar().elem::<f32>();
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);
                debug!("epoch {} batch loss {loss_value:.4}", epoch + 1);
                if progress_due(batch_idx, total_batches) {
                    info!(
                        "Epoch {}/{} [{}/{}] {:.0}% loss {loss_value:.4}",
                        epoch + 1,
                        train_cfg.epochs,
                        batch_idx + 1,
                        total_batches,
                        (batch_idx + 1) as f32 / total_batches as f32 * 100.0
                    );
                }

                totals.loss_sum += loss_value;
                totals.batches += 1;
                totals.correct += correct;
                totals.samples += batch.len();
            }
            schedule.advance();

            let valid_model = model.valid();
            let val_totals = validate(&valid_model, &loader, val, &val_loss_fn, &self.device)?;

            let meta = CheckpointMeta {
                classes: self.labels.classes().to_vec(),
                num_classes: self.labels.len(),
                epochs_completed: epoch + 1,
                schedule,
            };
            checkpoint::save(&valid_model, &meta, &self.config.paths.checkpoint)?;

            let summary = EpochSummary {
                epoch,
                train_loss: totals.loss_sum,
                train_accuracy: totals.accuracy(),
                val_loss: val_totals.mean_loss(),
                val_accuracy: val_totals.accuracy(),
                learning_rate: lr,
                extraction: extractor.stats(),
            };
            info!(
                "Epoch {}/{}: train loss {:.4}, train acc {:.2}%, val loss {:.4}, val acc {:.2}%, lr {:.2e}",
                epoch + 1,
                train_cfg.epochs,
                summary.train_loss,
                summary.train_accuracy,
                summary.val_loss,
                summary.val_accuracy,
                summary.learning_rate
            );
            if summary.extraction.failed > 0 {
                warn!(
                    "{} of {} audio files replaced by silence so far",
                    summary.extraction.failed,
                    summary.extraction.total()
                );
            }
            summaries.push(summary);
        }
        Ok(summaries)
    }

    fn initial_state(&self) -> Result<TrainState<B>, PipelineError> {
        let train_cfg = &self.config.train;
        let path = &self.config.paths.checkpoint;
        let fresh_schedule = CosineSchedule::new(train_cfg.learning_rate, train_cfg.epochs);
        if !path.is_file() {
            info!(
                "No checkpoint at {}, starting from random weights",
                path.display()
            );
            return Ok(TrainState {
                model: Classifier::new(self.labels.len(), &self.device),
                start_epoch: 0,
                schedule: fresh_schedule,
            });
        }

        let (model, meta) = checkpoint::load::<B>(path, self.labels.classes(), &self.device)?;
        let (start_epoch, schedule) = match meta {
            Some(meta) if !train_cfg.restart_schedule => {
                let schedule = CosineSchedule {
                    step: meta.schedule.step,
                    ..fresh_schedule
                };
                (meta.epochs_completed, schedule)
            }
            _ => (0, fresh_schedule),
        };
        info!(
            "Resuming from {} at epoch {} (lr {:.2e})",
            path.display(),
            start_epoch + 1,
            schedule.lr()
        );
        Ok(TrainState {
            model,
            start_epoch,
            schedule,
        })
    }
}

/// Roughly every tenth batch, and always the last one.
fn progress_due(batch_idx: usize, total_batches: usize) -> bool {
    let every = (total_batches / PROGRESS_STEPS).max(1);
    (batch_idx + 1) % every == 0 || batch_idx + 1 == total_batches
}

/// Loss tensor and correct-prediction count for one batch.
fn forward_step<B: Backend>(
    model: &Classifier<B>,
    batch: &Batch,
    loss_fn: &CrossEntropyLoss<B>,
    device: &B::Device,
) -> Result<(Tensor<B, 1>, usize), PipelineError> {
    let logits = model.forward(batch.features_tensor::<B>(device));
    let targets = batch.labels_tensor::<B>(device);
    let host = model::host_logits(logits.clone()).map_err(PipelineError::Tensor)?;
    let correct = model::argmax_rows(&host, model.num_classes())
        .iter()
        .zip(batch.labels())
        .filter(|(pred, truth)| pred == truth)
        .count();
    Ok((loss_fn.forward(logits, targets), correct))
}

fn validate<B: Backend>(
    model: &Classifier<B>,
    loader: &BatchLoader<'_>,
    val: &AudioDataset,
    loss_fn: &CrossEntropyLoss<B>,
    device: &B::Device,
) -> Result<PassTotals, PipelineError> {
    let mut totals = PassTotals::default();
    let order = dataset::epoch_order::<StdRng>(val.len(), None);
    for batch in loader.batches(val, order) {
        let batch = batch?;
        if batch.is_empty() {
            continue;
        }
        let (loss, correct) = forward_step(model, &batch, loss_fn, device)?;
        totals.loss_sum += loss.into_scalar().elem::<f32>();
        totals.batches += 1;
        totals.correct += correct;
        totals.samples += batch.len();
    }
    Ok(totals)
}
