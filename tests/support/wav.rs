use std::path::Path;

/// Write mono 16-bit PCM.
pub fn write_test_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create wav parent dirs");
    }
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav writer");
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).expect("write wav sample");
    }
    writer.finalize().expect("finalize wav");
}

pub fn tone(freq_hz: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
    let len = (seconds * sample_rate as f32) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (t * freq_hz * std::f32::consts::TAU).sin() * 0.4
        })
        .collect()
}
