//! Train the emotion classifier and checkpoint it after every epoch.

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
    let report = pipeline::train(&config, &options.sources).map_err(|err| err.to_string())?;

    match report.epochs.last() {
        Some(last) => println!(
            "Finished {} epoch(s); last val acc {:.2}%, checkpoint at {}",
            report.epochs.len(),
            last.val_accuracy,
            config.paths.checkpoint.display()
        ),
        None => println!(
            "Checkpoint {} already covers {} epochs; nothing to do",
            config.paths.checkpoint.display(),
            config.train.epochs
        ),
    }
    println!("Classes: {}", report.labels.classes().join(", "));
    Ok(())
}

fn parse_args(args: &[String]) -> Result<CommonOptions, String> {
    let options = common::parse_common(args, help_text)?;
    common::require_sources(&options, help_text)?;
    Ok(options)
}

fn help_text() -> String {
    let mut lines = vec![
        "voxmood-train",
        "",
        "Trains the CNN emotion classifier on log-mel features.",
        "",
        "Usage:",
        "  voxmood-train --data <metadata> <audio_dir> [--data ...] [options]",
        "",
        "Options:",
    ];
    lines.extend_from_slice(COMMON_HELP);
    lines.extend_from_slice(&[
        "  --epochs <n>                Override train.epochs",
        "  --restart-schedule          Warm-start from the checkpoint with a fresh schedule",
    ]);
    lines.join("\n")
}
