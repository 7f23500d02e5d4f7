#![allow(dead_code)]

pub mod wav;

use std::path::Path;

use voxmood::config::PipelineConfig;
use voxmood::dataset::DataSource;

/// Label per class-distinct test tone.
pub const CLASSES: [(&str, f32); 3] = [("neutral", 220.0), ("angry", 880.0), ("happy", 440.0)];

/// Write `count` labelled clips plus a JSONL metadata table under `root`.
///
/// Clips cycle through [`CLASSES`]; every third clip is recorded at 8 kHz so
/// resampling is exercised.
pub fn write_fixture(root: &Path, count: usize) -> DataSource {
    let audio_dir = root.join("audio");
    let mut lines = Vec::with_capacity(count);
    for idx in 0..count {
        let (label, freq) = CLASSES[idx % CLASSES.len()];
        let rate = if idx % 3 == 2 { 8_000 } else { 16_000 };
        let seconds = 0.5 + 0.25 * (idx % 4) as f32;
        let id = format!("clip{idx:03}");
        wav::write_test_wav(
            &audio_dir.join(format!("{id}.wav")),
            &wav::tone(freq, seconds, rate),
            rate,
        );
        lines.push(format!(
            "{{\"hash_id\":\"{id}\",\"annotator_emo\":\"{label}\"}}"
        ));
    }
    let metadata = root.join("metadata.jsonl");
    std::fs::write(&metadata, lines.join("\n")).expect("write metadata");
    DataSource::new(metadata, audio_dir)
}

/// Small, fast config with every artifact under `root`.
pub fn test_config(root: &Path, epochs: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.label_encoder = root.join("label_encoder.json");
    config.paths.checkpoint = root.join("emotion_model.bpk");
    config.paths.onnx = root.join("emotion_model.onnx");
    config.paths.log_dir = root.join("logs");
    config.train.epochs = epochs;
    config.train.batch_size = 4;
    config.train.num_workers = 2;
    config
}
