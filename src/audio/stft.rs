use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Centered short-time power spectrum with reflect padding of `n_fft / 2`.
pub(crate) struct PowerStft {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl PowerStft {
    pub(crate) fn new(n_fft: usize, hop: usize) -> Self {
        let n_fft = n_fft.max(2);
        let hop = hop.max(1);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            n_fft,
            hop,
            window: periodic_hann(n_fft),
            fft,
            buf: vec![Complex::default(); n_fft],
            scratch,
        }
    }

    /// Number of one-sided frequency bins per frame.
    pub(crate) fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frame count for a centered transform over `len` samples.
    pub(crate) fn frame_count(&self, len: usize) -> usize {
        frame_count(len, self.hop)
    }

    /// Call `sink(frame_index, power)` for every frame of `samples`.
    pub(crate) fn for_each_frame(&mut self, samples: &[f32], mut sink: impl FnMut(usize, &[f32])) {
        if samples.is_empty() {
            return;
        }
        let pad = (self.n_fft / 2) as isize;
        let frames = self.frame_count(samples.len());
        let mut power = vec![0.0_f32; self.bins()];
        for frame in 0..frames {
            let start = (frame * self.hop) as isize - pad;
            for (i, cell) in self.buf.iter_mut().enumerate() {
                let sample = samples[reflect_index(start + i as isize, samples.len())];
                *cell = Complex::new(sample * self.window[i], 0.0);
            }
            self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);
            for (slot, c) in power.iter_mut().zip(self.buf.iter()) {
                *slot = c.re * c.re + c.im * c.im;
            }
            sink(frame, &power);
        }
    }
}

pub(crate) fn frame_count(len: usize, hop: usize) -> usize {
    1 + len / hop.max(1)
}

/// Hann window of length `n` that repeats with period `n`.
pub(crate) fn periodic_hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}

/// Mirror `index` into `0..len` without repeating the edge sample.
fn reflect_index(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut idx = index.rem_euclid(period);
    if idx >= len as isize {
        idx = period - idx;
    }
    idx as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_matches_numpy_reflect_mode() {
        let len = 5;
        let mapped: Vec<usize> = (-3..8).map(|i| reflect_index(i, len)).collect();
        assert_eq!(mapped, vec![3, 2, 1, 0, 1, 2, 3, 4, 3, 2, 1]);
    }

    #[test]
    fn frame_count_follows_centered_layout() {
        let mut stft = PowerStft::new(400, 200);
        let samples = vec![0.1_f32; 16_000];
        let mut frames = 0;
        stft.for_each_frame(&samples, |_, power| {
            assert_eq!(power.len(), 201);
            frames += 1;
        });
        assert_eq!(frames, 81);
        assert_eq!(stft.frame_count(16_000), 81);
        assert_eq!(stft.frame_count(199), 1);
    }

    #[test]
    fn periodic_hann_starts_at_zero_and_peaks_mid_window() {
        let window = periodic_hann(400);
        assert!(window[0].abs() < 1e-7);
        assert!((window[200] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dc_signal_concentrates_in_bin_zero() {
        let mut stft = PowerStft::new(400, 200);
        let samples = vec![1.0_f32; 4_000];
        let mut middle = Vec::new();
        stft.for_each_frame(&samples, |frame, power| {
            if frame == 10 {
                middle = power.to_vec();
            }
        });
        let dc = middle[0];
        assert!(middle[5..].iter().all(|&p| p < dc * 1e-6));
    }
}
