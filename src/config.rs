//! TOML configuration for the train, evaluate and export drivers.
//!
//! Every field has a default so an absent file (or an absent section) yields
//! the stock pipeline settings. The loaded config is handed explicitly to each
//! component constructor; nothing reads ambient global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub features: FeatureConfig,
    pub train: TrainConfig,
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
}

/// Artifact locations shared by all drivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub label_encoder: PathBuf,
    pub checkpoint: PathBuf,
    pub onnx: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            label_encoder: PathBuf::from("label_encoder.json"),
            checkpoint: PathBuf::from("emotion_model.bpk"),
            onnx: PathBuf::from("emotion_model.onnx"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Log-mel front end parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub mel_bins: usize,
    /// Fixed frame count of collated batches and of the failure placeholder.
    pub frames: usize,
    pub log_epsilon: f32,
    /// Log the cumulative success rate every N samples.
    pub progress_every: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            n_fft: 400,
            hop_length: 200,
            mel_bins: 64,
            frames: 300,
            log_epsilon: 1e-9,
            progress_every: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f32,
    pub train_fraction: f32,
    pub seed: u64,
    pub num_workers: usize,
    /// Warm-start from the checkpoint but run the full schedule from epoch 0.
    pub restart_schedule: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 30,
            batch_size: 32,
            learning_rate: 1e-4,
            weight_decay: 1e-5,
            train_fraction: 0.8,
            seed: 42,
            num_workers: 4,
            restart_schedule: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub level: String,
    /// Log files kept per binary, newest first.
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            keep_files: 10,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let features = &self.features;
        if features.sample_rate == 0 || features.n_fft < 2 || features.hop_length == 0 {
            return Err(ConfigError::Invalid(
                "features.sample_rate, n_fft and hop_length must be positive".to_string(),
            ));
        }
        if features.mel_bins == 0 || features.frames == 0 {
            return Err(ConfigError::Invalid(
                "features.mel_bins and features.frames must be positive".to_string(),
            ));
        }
        let train = &self.train;
        if train.batch_size == 0 {
            return Err(ConfigError::Invalid("train.batch_size must be positive".to_string()));
        }
        if !(train.train_fraction > 0.0 && train.train_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "train.train_fraction must be in (0, 1], got {}",
                train.train_fraction
            )));
        }
        if !train.learning_rate.is_finite() || train.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "train.learning_rate must be a positive number".to_string(),
            ));
        }
        if self.logging.keep_files == 0 {
            return Err(ConfigError::Invalid(
                "logging.keep_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voxmood.toml");
        std::fs::write(
            &path,
            "[train]\nepochs = 3\nbatch_size = 4\n\n[paths]\ncheckpoint = \"run/model.bpk\"\n",
        )
        .unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.train.epochs, 3);
        assert_eq!(config.train.batch_size, 4);
        assert_eq!(config.train.learning_rate, 1e-4);
        assert_eq!(config.paths.checkpoint, PathBuf::from("run/model.bpk"));
        assert_eq!(config.paths.label_encoder, PathBuf::from("label_encoder.json"));
        assert_eq!(config.features.frames, 300);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = PipelineConfig::default();
        config.train.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn logging_section_is_read_and_checked() {
        let config: PipelineConfig =
            toml::from_str("[logging]\nlevel = \"voxmood=debug,warn\"\nkeep_files = 3\n").unwrap();
        assert_eq!(config.logging.level, "voxmood=debug,warn");
        assert_eq!(config.logging.keep_files, 3);

        let mut config = PipelineConfig::default();
        config.logging.keep_files = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_path_falls_back_to_defaults() {
        let config = PipelineConfig::load_or_default(None).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
