//! Argument handling shared by the voxmood binaries.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use voxmood::backend::BackendKind;
use voxmood::config::PipelineConfig;
use voxmood::dataset::DataSource;
use voxmood::eval::Evaluation;
use voxmood::logging;
use voxmood::pipeline::EvalSplit;

#[derive(Debug, Clone, Default)]
pub struct CommonOptions {
    pub config: Option<PathBuf>,
    pub sources: Vec<DataSource>,
    pub checkpoint: Option<PathBuf>,
    pub label_encoder: Option<PathBuf>,
    pub onnx: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub split: EvalSplit,
    pub report_json: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub restart_schedule: bool,
}

pub const COMMON_HELP: &[&str] = &[
    "  --config <file>             TOML pipeline config (defaults apply when omitted)",
    "  --data <metadata> <dir>     Metadata table (.jsonl/.csv) and its audio directory; repeatable",
    "  --labels <file>             Label encoder JSON (default label_encoder.json)",
    "  --checkpoint <file>         Model checkpoint (default emotion_model.bpk)",
    "  --onnx <file>               Exported ONNX model (default emotion_model.onnx)",
    "  --backend <cpu|wgpu|cuda>   Compute backend override",
];

pub fn parse_common(args: &[String], help: fn() -> String) -> Result<CommonOptions, String> {
    let mut options = CommonOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help()),
            "--config" => options.config = Some(PathBuf::from(value(args, &mut idx, "--config")?)),
            "--data" => {
                let metadata = value(args, &mut idx, "--data")?.to_string();
                let audio_dir = value(args, &mut idx, "--data")?;
                options.sources.push(DataSource::new(metadata, audio_dir));
            }
            "--labels" => {
                options.label_encoder = Some(PathBuf::from(value(args, &mut idx, "--labels")?))
            }
            "--checkpoint" => {
                options.checkpoint = Some(PathBuf::from(value(args, &mut idx, "--checkpoint")?))
            }
            "--onnx" => options.onnx = Some(PathBuf::from(value(args, &mut idx, "--onnx")?)),
            "--backend" => {
                let raw = value(args, &mut idx, "--backend")?;
                let kind = BackendKind::parse(raw)
                    .ok_or_else(|| format!("Invalid --backend value: {raw}"))?;
                options.backend = Some(kind);
            }
            "--split" => {
                let raw = value(args, &mut idx, "--split")?;
                options.split =
                    EvalSplit::parse(raw).ok_or_else(|| format!("Invalid --split value: {raw}"))?;
            }
            "--report-json" => {
                options.report_json = Some(PathBuf::from(value(args, &mut idx, "--report-json")?))
            }
            "--epochs" => {
                let raw = value(args, &mut idx, "--epochs")?;
                options.epochs = Some(
                    raw.parse::<usize>()
                        .map_err(|_| format!("Invalid --epochs value: {raw}"))?,
                );
            }
            "--restart-schedule" => options.restart_schedule = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help())),
        }
        idx += 1;
    }
    Ok(options)
}

/// Advance to and return the value following `args[*idx]`.
pub fn value<'a>(args: &'a [String], idx: &mut usize, flag: &str) -> Result<&'a str, String> {
    *idx += 1;
    args.get(*idx)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

/// Load the config, apply command-line overrides and start logging.
pub fn load_config(options: &CommonOptions) -> Result<PipelineConfig, String> {
    let mut config =
        PipelineConfig::load_or_default(options.config.as_deref()).map_err(|err| err.to_string())?;
    if let Some(path) = &options.checkpoint {
        config.paths.checkpoint = path.clone();
    }
    if let Some(path) = &options.label_encoder {
        config.paths.label_encoder = path.clone();
    }
    if let Some(path) = &options.onnx {
        config.paths.onnx = path.clone();
    }
    if let Some(kind) = options.backend {
        config.device.backend = kind;
    }
    if let Some(epochs) = options.epochs {
        config.train.epochs = epochs;
    }
    if options.restart_schedule {
        config.train.restart_schedule = true;
    }
    config.validate().map_err(|err| err.to_string())?;
    if let Err(err) = logging::init(env!("CARGO_BIN_NAME"), &config.paths.log_dir, &config.logging) {
        eprintln!("Logging disabled: {err}");
    }
    Ok(config)
}

pub fn require_sources(options: &CommonOptions, help: fn() -> String) -> Result<(), String> {
    if options.sources.is_empty() {
        return Err(format!("At least one --data pair is required\n\n{}", help()));
    }
    Ok(())
}

/// Print accuracy, report and confusion matrix; optionally dump JSON stats.
pub fn print_evaluation(evaluation: &Evaluation, report_json: Option<&Path>) -> Result<(), String> {
    let stats = &evaluation.stats;
    println!("Accuracy: {:.4}", stats.accuracy);
    println!();
    println!("Classification report:");
    println!("{}", stats.classification_report());
    println!("Confusion matrix (rows=true, cols=pred):");
    println!("{}", stats.confusion_table());
    if let Some(path) = report_json {
        let json = serde_json::to_string_pretty(stats).map_err(|err| err.to_string())?;
        std::fs::write(path, json)
            .map_err(|err| format!("Failed to write {}: {err}", path.display()))?;
        println!("Wrote report to {}", path.display());
    }
    Ok(())
}
