//! Waveform decoding and log-mel spectrogram computation.

mod decode;
mod mel;
mod resample;
mod stft;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::FeatureConfig;

pub(crate) use resample::resampled_len;
pub(crate) use stft::frame_count;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Audio decode failed for {path}: {detail}")]
    Decode { path: PathBuf, detail: String },
    #[error("Decoded 0 samples from {0}")]
    Empty(PathBuf),
}

impl AudioError {
    fn decode(path: &Path, detail: impl Into<String>) -> Self {
        AudioError::Decode {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Log-mel spectrogram for one mono clip, `[1, mel_bins, frames]`.
///
/// Values are stored row-major by mel band: `data[band * frames + frame]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMel {
    mel_bins: usize,
    frames: usize,
    data: Vec<f32>,
}

impl LogMel {
    pub fn zeros(mel_bins: usize, frames: usize) -> Self {
        Self {
            mel_bins,
            frames,
            data: vec![0.0; mel_bins * frames],
        }
    }

    /// Build from band-major data; `None` when the length does not match.
    pub fn from_vec(mel_bins: usize, frames: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == mel_bins * frames).then_some(Self {
            mel_bins,
            frames,
            data,
        })
    }

    /// `[channels, mel_bins, frames]`.
    pub fn shape(&self) -> [usize; 3] {
        [1, self.mel_bins, self.frames]
    }

    pub fn mel_bins(&self) -> usize {
        self.mel_bins
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// One mel band across all frames.
    pub fn band(&self, band: usize) -> &[f32] {
        &self.data[band * self.frames..(band + 1) * self.frames]
    }
}

/// Mono decode, resample, STFT and mel projection with `ln(x + eps)`.
pub(crate) struct LogMelPipeline {
    sample_rate: u32,
    mel_bins: usize,
    log_epsilon: f32,
    stft: stft::PowerStft,
    mel_bank: mel::MelBank,
}

impl LogMelPipeline {
    pub(crate) fn new(config: &FeatureConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            mel_bins: config.mel_bins,
            log_epsilon: config.log_epsilon,
            stft: stft::PowerStft::new(config.n_fft, config.hop_length),
            mel_bank: mel::MelBank::new(config.sample_rate, config.n_fft, config.mel_bins),
        }
    }

    pub(crate) fn load(&mut self, path: &Path) -> Result<LogMel, AudioError> {
        let decoded = decode::decode_audio(path)?;
        let mono = decode::downmix_to_mono(&decoded.samples, decoded.channels);
        if mono.is_empty() {
            return Err(AudioError::Empty(path.to_path_buf()));
        }
        let resampled = resample::resample_linear(&mono, decoded.sample_rate, self.sample_rate);
        Ok(self.log_mel(&resampled))
    }

    /// Log-mel of samples already at the pipeline rate.
    pub(crate) fn log_mel(&mut self, samples: &[f32]) -> LogMel {
        let frames = self.stft.frame_count(samples.len());
        let mut out = LogMel::zeros(self.mel_bins, frames);
        let mut mel = vec![0.0_f32; self.mel_bins];
        let eps = self.log_epsilon;
        let mel_bank = &self.mel_bank;
        let data = &mut out.data;
        self.stft.for_each_frame(samples, |frame, power| {
            mel_bank.apply_into(power, &mut mel);
            for (band, &energy) in mel.iter().enumerate() {
                data[band * frames + frame] = (energy + eps).ln();
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_mel_shape_follows_sample_count() {
        let mut pipeline = LogMelPipeline::new(&FeatureConfig::default());
        let samples: Vec<f32> = (0..8_000)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16_000.0).sin())
            .collect();
        let mel = pipeline.log_mel(&samples);
        assert_eq!(mel.shape(), [1, 64, 41]);
        assert!(mel.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn silence_is_log_epsilon() {
        let mut pipeline = LogMelPipeline::new(&FeatureConfig::default());
        let mel = pipeline.log_mel(&vec![0.0; 1_000]);
        let expected = 1e-9_f32.ln();
        assert!(mel.data().iter().all(|v| (v - expected).abs() < 1e-3));
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(LogMel::from_vec(2, 3, vec![0.0; 5]).is_none());
        let mel = LogMel::from_vec(2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(mel.band(1), &[3.0, 4.0, 5.0]);
    }
}
