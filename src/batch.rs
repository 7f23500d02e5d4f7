//! Fixed-shape batch assembly.
//!
//! Every collated batch has exactly `frames` frames per sample: shorter
//! spectrograms are zero-padded on the right, longer ones keep their first
//! `frames` frames. The batch lives on the host so both the native and the
//! exported-model backends consume the same contract.

use burn::prelude::*;
use thiserror::Error;

use crate::audio::LogMel;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("Sample {index} has {found} mel bins, expected {expected}")]
    MelBins {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// `[batch, 1, mel_bins, frames]` features plus parallel class indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    mel_bins: usize,
    frames: usize,
    features: Vec<f32>,
    labels: Vec<usize>,
}

impl Batch {
    /// Wrap pre-stacked features; `None` when sizes disagree.
    pub fn from_parts(
        mel_bins: usize,
        frames: usize,
        features: Vec<f32>,
        labels: Vec<usize>,
    ) -> Option<Self> {
        (features.len() == labels.len() * mel_bins * frames).then_some(Self {
            mel_bins,
            frames,
            features,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn shape(&self) -> [usize; 4] {
        [self.len(), 1, self.mel_bins, self.frames]
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Features of sample `index` as `[mel_bins * frames]`.
    pub fn sample(&self, index: usize) -> &[f32] {
        let stride = self.mel_bins * self.frames;
        &self.features[index * stride..(index + 1) * stride]
    }

    pub fn features_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(TensorData::new(self.features.clone(), self.shape()), device)
    }

    pub fn labels_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        let labels: Vec<i64> = self.labels.iter().map(|&label| label as i64).collect();
        Tensor::from_data(TensorData::new(labels, [self.len()]), device)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchCollator {
    mel_bins: usize,
    frames: usize,
}

impl BatchCollator {
    pub fn new(mel_bins: usize, frames: usize) -> Self {
        Self { mel_bins, frames }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Pad or truncate every sample to `frames` and stack them.
    ///
    /// Only the time axis is adjusted; a sample with a different mel-bin
    /// count is rejected.
    pub fn collate(&self, samples: Vec<(LogMel, usize)>) -> Result<Batch, BatchError> {
        let stride = self.mel_bins * self.frames;
        let mut features = vec![0.0_f32; samples.len() * stride];
        let mut labels = Vec::with_capacity(samples.len());
        for (index, (slot, (mel, label))) in features.chunks_exact_mut(stride).zip(samples).enumerate() {
            if mel.mel_bins() != self.mel_bins {
                return Err(BatchError::MelBins {
                    index,
                    expected: self.mel_bins,
                    found: mel.mel_bins(),
                });
            }
            let keep = mel.frames().min(self.frames);
            for band in 0..self.mel_bins {
                let dst = &mut slot[band * self.frames..band * self.frames + keep];
                dst.copy_from_slice(&mel.band(band)[..keep]);
            }
            labels.push(label);
        }
        Ok(Batch {
            mel_bins: self.mel_bins,
            frames: self.frames,
            features,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(mel_bins: usize, frames: usize) -> LogMel {
        let data = (0..mel_bins * frames).map(|i| i as f32 + 1.0).collect();
        LogMel::from_vec(mel_bins, frames, data).unwrap()
    }

    #[test]
    fn mixed_lengths_collate_to_uniform_frames() {
        let collator = BatchCollator::new(64, 300);
        let batch = collator.collate(vec![
            (ramp(64, 120), 0),
            (ramp(64, 300), 1),
            (ramp(64, 50), 2),
        ])
        .unwrap();
        assert_eq!(batch.shape(), [3, 1, 64, 300]);
        assert_eq!(batch.labels(), &[0, 1, 2]);

        for (index, source_frames) in [(0usize, 120usize), (1, 300), (2, 50)] {
            let sample = batch.sample(index);
            let source = ramp(64, source_frames);
            for band in 0..64 {
                let row = &sample[band * 300..(band + 1) * 300];
                assert_eq!(&row[..source_frames], source.band(band));
                assert!(row[source_frames..].iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn over_length_input_keeps_leading_frames() {
        let collator = BatchCollator::new(4, 300);
        let long = ramp(4, 420);
        let batch = collator.collate(vec![(long.clone(), 5)]).unwrap();
        let sample = batch.sample(0);
        for band in 0..4 {
            assert_eq!(&sample[band * 300..(band + 1) * 300], &long.band(band)[..300]);
        }
    }

    #[test]
    fn empty_input_gives_empty_batch() {
        let batch = BatchCollator::new(64, 300).collate(Vec::new()).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.shape(), [0, 1, 64, 300]);
    }

    #[test]
    fn mismatched_mel_bins_are_rejected() {
        let collator = BatchCollator::new(64, 300);
        let err = collator
            .collate(vec![(ramp(64, 10), 0), (ramp(32, 10), 1)])
            .unwrap_err();
        assert_eq!(
            err,
            BatchError::MelBins {
                index: 1,
                expected: 64,
                found: 32
            }
        );
    }
}
