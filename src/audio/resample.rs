/// Linearly resample `samples` from `input_rate` to `output_rate`.
///
/// Matching rates return the input unchanged.
pub(crate) fn resample_linear(samples: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    let input_rate = input_rate.max(1);
    let output_rate = output_rate.max(1);
    if samples.is_empty() || input_rate == output_rate {
        return samples.to_vec();
    }
    let out_len = resampled_len(samples.len(), input_rate, output_rate);
    let step = input_rate as f64 / output_rate as f64;
    (0..out_len)
        .map(|i| lerp_sample(samples, i as f64 * step))
        .collect()
}

/// Number of samples produced when resampling `len` input samples.
pub(crate) fn resampled_len(len: usize, input_rate: u32, output_rate: u32) -> usize {
    if len == 0 {
        return 0;
    }
    let input_rate = input_rate.max(1);
    let output_rate = output_rate.max(1);
    if input_rate == output_rate {
        return len;
    }
    let duration_seconds = len as f64 / input_rate as f64;
    (duration_seconds * output_rate as f64).round().max(1.0) as usize
}

fn lerp_sample(samples: &[f32], pos: f64) -> f32 {
    let idx0 = pos.floor().max(0.0) as usize;
    let frac = (pos - idx0 as f64).clamp(0.0, 1.0) as f32;
    let last = samples.len().saturating_sub(1);
    let idx0 = idx0.min(last);
    let idx1 = idx0.saturating_add(1).min(last);
    let a = samples[idx0];
    let b = samples[idx1];
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_endpoints_survive_upsampling() {
        let out = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(out.len(), 4);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn downsampling_halves_length() {
        let input = vec![0.3_f32; 32_000];
        let out = resample_linear(&input, 32_000, 16_000);
        assert_eq!(out.len(), 16_000);
        assert_eq!(out.len(), resampled_len(input.len(), 32_000, 16_000));
        assert!(out.iter().all(|v| (v - 0.3).abs() < 1e-6));
    }

    #[test]
    fn equal_rates_are_identity() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }
}
