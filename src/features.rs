//! Per-sample feature extraction with a non-fatal failure policy.
//!
//! Any read, decode or resample failure is logged with the offending path and
//! replaced by an all-zero `[1, mel_bins, frames]` placeholder, so one corrupt
//! file cannot end a long run. The placeholder still flows into training.
//! Success and failure counts are kept as atomics and exposed through
//! [`FeatureExtractor::stats`].

use std::cell::RefCell;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::{self, LogMel, LogMelPipeline};
use crate::config::FeatureConfig;

/// Snapshot of the extraction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub succeeded: usize,
    pub failed: usize,
}

impl ExtractionStats {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Cumulative success rate in percent; 0 before any sample.
    pub fn success_rate(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.succeeded as f32 / total as f32 * 100.0
        }
    }
}

pub struct FeatureExtractor {
    config: FeatureConfig,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

thread_local! {
    static PIPELINE: RefCell<Option<(FeatureConfig, LogMelPipeline)>> = const { RefCell::new(None) };
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            config: config.clone(),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Log-mel features for `path`, or the zero placeholder on failure.
    pub fn extract(&self, path: &Path) -> LogMel {
        let features = match self.try_extract(path) {
            Ok(features) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                features
            }
            Err(err) => {
                warn!("Failed to load {}: {err}", path.display());
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.placeholder()
            }
        };
        self.report_progress();
        features
    }

    /// Extraction without the fallback, for callers that want the error.
    pub fn try_extract(&self, path: &Path) -> Result<LogMel, audio::AudioError> {
        PIPELINE.with(|cell| {
            let mut slot = cell.borrow_mut();
            if !slot
                .as_ref()
                .is_some_and(|(config, _)| *config == self.config)
            {
                *slot = None;
            }
            let (_, pipeline) = slot
                .get_or_insert_with(|| (self.config.clone(), LogMelPipeline::new(&self.config)));
            pipeline.load(path)
        })
    }

    /// All-zero features with the fixed batch frame count.
    pub fn placeholder(&self) -> LogMel {
        LogMel::zeros(self.config.mel_bins, self.config.frames)
    }

    pub fn stats(&self) -> ExtractionStats {
        ExtractionStats {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    fn report_progress(&self) {
        let every = self.config.progress_every;
        if every == 0 {
            return;
        }
        let stats = self.stats();
        if stats.total() > 0 && stats.total() % every == 0 {
            info!(
                "Audio loading progress: {:.2}% ({}/{} succeeded)",
                stats.success_rate(),
                stats.succeeded,
                stats.total()
            );
        }
    }
}

/// Frame count `extract` yields for a clip of `len` samples at `native_rate`.
pub fn expected_frames(len: usize, native_rate: u32, config: &FeatureConfig) -> usize {
    let resampled = audio::resampled_len(len, native_rate, config.sample_rate);
    audio::frame_count(resampled, config.hop_length)
}
