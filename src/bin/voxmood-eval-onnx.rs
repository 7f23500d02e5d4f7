//! Evaluate the exported ONNX model through ONNX Runtime.

mod common;

use common::{COMMON_HELP, CommonOptions};
use voxmood::pipeline;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = parse_args(&args)?;
    let config = common::load_config(&options)?;
    let evaluation = pipeline::evaluate_onnx(&config, &options.sources, options.split)
        .map_err(|err| err.to_string())?;
    common::print_evaluation(&evaluation, options.report_json.as_deref())
}

fn parse_args(args: &[String]) -> Result<CommonOptions, String> {
    let options = common::parse_common(args, help_text)?;
    common::require_sources(&options, help_text)?;
    Ok(options)
}

fn help_text() -> String {
    let mut lines = vec![
        "voxmood-eval-onnx",
        "",
        "Scores the exported ONNX model on held-out audio.",
        "",
        "Usage:",
        "  voxmood-eval-onnx --data <metadata> <audio_dir> [--data ...] [options]",
        "",
        "Options:",
    ];
    lines.extend_from_slice(COMMON_HELP);
    lines.extend_from_slice(&[
        "  --split <all|val>           Every sample (default) or the training validation split",
        "  --report-json <file>        Also write the statistics as JSON",
    ]);
    lines.join("\n")
}
