//! Audio emotion classification: log-mel features, a CNN classifier, training,
//! native and ONNX evaluation, and ONNX export.
/// Waveform decoding and log-mel spectrograms.
pub mod audio;
/// Compute-device selection.
pub mod backend;
/// Fixed-shape batch assembly.
pub mod batch;
/// TOML pipeline configuration.
pub mod config;
/// Metadata tables, dataset split and batch loading.
pub mod dataset;
/// Crate error taxonomy.
pub mod error;
/// Native and ONNX evaluation.
pub mod eval;
/// ONNX export of trained models.
pub mod export;
/// Per-sample feature extraction with failure counters.
pub mod features;
/// Persisted label encoding.
pub mod labels;
/// Logging setup for the binaries.
pub mod logging;
/// Classification metrics.
pub mod metrics;
/// CNN classifier.
pub mod model;
/// Driver entry points shared by the binaries.
pub mod pipeline;
/// Training loop, schedule and checkpoints.
pub mod train;

pub use error::PipelineError;
