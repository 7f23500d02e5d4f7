//! Crate-wide error taxonomy.
//!
//! Per-sample audio failures never surface here; they are absorbed by
//! [`crate::features::FeatureExtractor`]. Everything else propagates to the
//! driver binary and ends the run.

use thiserror::Error;

use crate::batch::BatchError;
use crate::config::ConfigError;
use crate::dataset::metadata::MetadataError;
use crate::eval::EvalError;
use crate::export::ExportError;
use crate::labels::LabelError;
use crate::train::checkpoint::CheckpointError;

/// Top-level error returned by the train, evaluate and export drivers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Labels(#[from] LabelError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Export(#[from] ExportError),
    /// The dataset produced no samples after loading all metadata tables.
    #[error("Dataset is empty")]
    EmptyDataset,
    #[error("Failed to start feature workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
    #[error("Tensor data error: {0}")]
    Tensor(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
