//! Export the trained checkpoint as an ONNX model.

mod common;

use common::COMMON_HELP;
use voxmood::pipeline;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = common::parse_common(&args, help_text)?;
    let config = common::load_config(&options)?;
    let path = pipeline::export(&config).map_err(|err| err.to_string())?;
    println!("ONNX model written to {}", path.display());
    Ok(())
}

fn help_text() -> String {
    let mut lines = vec![
        "voxmood-export",
        "",
        "Writes the checkpoint as an ONNX graph with input 'input' [batch_size,1,64,300]",
        "and output 'output' [batch_size,num_classes].",
        "",
        "Usage:",
        "  voxmood-export [options]",
        "",
        "Options:",
    ];
    lines.extend_from_slice(COMMON_HELP);
    lines.join("\n")
}
