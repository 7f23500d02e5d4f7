//! Shared driver logic behind the train, evaluate and export binaries.
//!
//! Each entry point takes the loaded [`PipelineConfig`] explicitly and
//! resolves the compute backend through [`crate::backend::dispatch`].

use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use tracing::info;

use crate::backend::{self, BackendTask};
use crate::config::PipelineConfig;
use crate::dataset::{self, AudioDataset, BatchLoader, DataSource};
use crate::error::PipelineError;
use crate::eval::{self, Evaluation, NativeBackend};
use crate::export;
use crate::features::FeatureExtractor;
use crate::labels::LabelEncoding;
use crate::train::{EpochSummary, Trainer, checkpoint};

/// Which part of the combined dataset an evaluation run scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvalSplit {
    /// Every row of the given metadata tables.
    #[default]
    All,
    /// The held-out split drawn with the training seed and fraction.
    Validation,
}

impl EvalSplit {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "val" | "validation" => Some(EvalSplit::Validation),
            "all" => Some(EvalSplit::All),
            _ => None,
        }
    }
}

/// Load every source, then reuse or fit the persisted label encoding.
///
/// Only training may fit a new encoding.
pub fn load_dataset(
    config: &PipelineConfig,
    sources: &[DataSource],
) -> Result<(LabelEncoding, AudioDataset), PipelineError> {
    let clips = load_nonempty_clips(sources)?;
    let labels = LabelEncoding::load_or_fit(
        &config.paths.label_encoder,
        clips.iter().map(|clip| clip.raw_label.as_str()),
    )?;
    let data = AudioDataset::encode(&clips, &labels)?;
    Ok((labels, data))
}

/// Load every source against the persisted label encoding, which must exist.
pub fn load_eval_dataset(
    config: &PipelineConfig,
    sources: &[DataSource],
) -> Result<(LabelEncoding, AudioDataset), PipelineError> {
    let labels = LabelEncoding::load(&config.paths.label_encoder)?;
    let clips = load_nonempty_clips(sources)?;
    let data = AudioDataset::encode(&clips, &labels)?;
    Ok((labels, data))
}

fn load_nonempty_clips(sources: &[DataSource]) -> Result<Vec<dataset::LabeledClip>, PipelineError> {
    let clips = dataset::load_clips(sources)?;
    if clips.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }
    Ok(clips)
}

pub struct TrainReport {
    pub labels: LabelEncoding,
    pub epochs: Vec<EpochSummary>,
}

/// Split, train and checkpoint on the configured backend.
pub fn train(
    config: &PipelineConfig,
    sources: &[DataSource],
) -> Result<TrainReport, PipelineError> {
    let (labels, data) = load_dataset(config, sources)?;
    let (train_set, val_set) = data.split(config.train.train_fraction, config.train.seed);
    info!(
        "Dataset: {} samples, {} classes, split {}/{}",
        data.len(),
        labels.len(),
        train_set.len(),
        val_set.len()
    );
    let task = TrainTask {
        config,
        labels: labels.clone(),
        train: &train_set,
        val: &val_set,
    };
    let epochs = backend::dispatch(config.device.backend, task)??;
    Ok(TrainReport { labels, epochs })
}

struct TrainTask<'a> {
    config: &'a PipelineConfig,
    labels: LabelEncoding,
    train: &'a AudioDataset,
    val: &'a AudioDataset,
}

impl BackendTask for TrainTask<'_> {
    type Output = Result<Vec<EpochSummary>, PipelineError>;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output {
        Trainer::<B>::new(self.config, self.labels, device).fit(self.train, self.val)
    }
}

fn eval_subset(config: &PipelineConfig, data: AudioDataset, split: EvalSplit) -> AudioDataset {
    match split {
        EvalSplit::All => data,
        EvalSplit::Validation => data.split(config.train.train_fraction, config.train.seed).1,
    }
}

fn run_evaluation<I: eval::InferenceBackend + ?Sized>(
    config: &PipelineConfig,
    backend: &mut I,
    data: &AudioDataset,
    labels: &LabelEncoding,
) -> Result<Evaluation, PipelineError> {
    let extractor = FeatureExtractor::new(&config.features);
    let loader = BatchLoader::new(&extractor, config.train.batch_size, config.train.num_workers)?;
    let order = dataset::epoch_order::<StdRng>(data.len(), None);
    let evaluation = eval::evaluate(backend, loader.batches(data, order), labels)?;
    let stats = extractor.stats();
    info!(
        "Feature extraction: {} succeeded, {} failed ({:.2}%)",
        stats.succeeded,
        stats.failed,
        stats.success_rate()
    );
    Ok(evaluation)
}

/// Evaluate the checkpoint with the in-process model.
pub fn evaluate_native(
    config: &PipelineConfig,
    sources: &[DataSource],
    split: EvalSplit,
) -> Result<Evaluation, PipelineError> {
    let (labels, data) = load_eval_dataset(config, sources)?;
    let data = eval_subset(config, data, split);
    let task = NativeEvalTask {
        config,
        labels: &labels,
        data: &data,
    };
    backend::dispatch(config.device.backend, task)?
}

struct NativeEvalTask<'a> {
    config: &'a PipelineConfig,
    labels: &'a LabelEncoding,
    data: &'a AudioDataset,
}

impl BackendTask for NativeEvalTask<'_> {
    type Output = Result<Evaluation, PipelineError>;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output {
        let mut backend = NativeBackend::<B::InnerBackend>::load(
            &self.config.paths.checkpoint,
            self.labels,
            device,
        )?;
        run_evaluation(self.config, &mut backend, self.data, self.labels)
    }
}

/// Evaluate the exported ONNX graph through ONNX Runtime.
#[cfg(feature = "onnx-runtime")]
pub fn evaluate_onnx(
    config: &PipelineConfig,
    sources: &[DataSource],
    split: EvalSplit,
) -> Result<Evaluation, PipelineError> {
    let (labels, data) = load_eval_dataset(config, sources)?;
    let data = eval_subset(config, data, split);
    let mut backend = eval::OnnxBackend::load(&config.paths.onnx, labels.len())?;
    run_evaluation(config, &mut backend, &data, &labels)
}

/// Write the ONNX artifact for the current checkpoint.
pub fn export(config: &PipelineConfig) -> Result<PathBuf, PipelineError> {
    let labels = LabelEncoding::load(&config.paths.label_encoder)?;
    backend::dispatch(config.device.backend, ExportTask { config, labels })?
}

struct ExportTask<'a> {
    config: &'a PipelineConfig,
    labels: LabelEncoding,
}

impl BackendTask for ExportTask<'_> {
    type Output = Result<PathBuf, PipelineError>;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Self::Output {
        let (model, _) = checkpoint::load::<B::InnerBackend>(
            &self.config.paths.checkpoint,
            self.labels.classes(),
            &device,
        )?;
        let path = self.config.paths.onnx.clone();
        export::export_onnx(&model, &self.config.features, &path)?;
        Ok(path)
    }
}
