/// Triangular HTK mel filterbank over a one-sided power spectrum.
///
/// Filters are stored sparsely as `(bin, weight)` pairs and are not area
/// normalized.
pub(crate) struct MelBank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub(crate) fn new(sample_rate: u32, n_fft: usize, mel_bands: usize) -> Self {
        let f_max = sample_rate.max(1) as f32 * 0.5;
        let n_freqs = n_fft / 2 + 1;
        Self {
            filters: build_filters(sample_rate, n_freqs, mel_bands, 0.0, f_max),
        }
    }

    pub(crate) fn bands(&self) -> usize {
        self.filters.len()
    }

    pub(crate) fn apply_into(&self, power: &[f32], out: &mut [f32]) {
        for (filter, slot) in self.filters.iter().zip(out.iter_mut()) {
            let mut sum = 0.0_f64;
            for &(bin, weight) in filter {
                let p = power.get(bin).copied().unwrap_or(0.0).max(0.0) as f64;
                sum += p * weight as f64;
            }
            *slot = sum as f32;
        }
    }
}

fn build_filters(
    sample_rate: u32,
    n_freqs: usize,
    mel_bands: usize,
    f_min: f32,
    f_max: f32,
) -> Vec<Vec<(usize, f32)>> {
    let nyquist = sample_rate.max(1) as f32 * 0.5;
    let freq_step = if n_freqs > 1 {
        nyquist / (n_freqs - 1) as f32
    } else {
        0.0
    };
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max.max(f_min));
    let hz_points: Vec<f32> = (0..mel_bands + 2)
        .map(|i| {
            let t = i as f32 / (mel_bands + 1) as f32;
            mel_to_hz(mel_min + (mel_max - mel_min) * t)
        })
        .collect();

    (0..mel_bands)
        .map(|m| {
            let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            (0..n_freqs)
                .filter_map(|bin| {
                    let freq = bin as f32 * freq_step;
                    let w = tri_weight(freq, left, center, right);
                    (w > 0.0).then_some((bin, w))
                })
                .collect()
        })
        .collect()
}

fn tri_weight(freq: f32, left: f32, center: f32, right: f32) -> f32 {
    let up = if center > left {
        (freq - left) / (center - left)
    } else {
        0.0
    };
    let down = if right > center {
        (right - freq) / (right - center)
    } else {
        0.0
    };
    up.min(down).max(0.0)
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0_f32 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0_f32 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}
