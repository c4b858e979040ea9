//! Raw log normalizer
//!
//! Reads `data/*.json` and `data/*.jsonl`, writes `prepared/event_summaries.json`.
//! Usage: cargo run --bin normalize_logs

use anyhow::{Context, Result};
use authrag::{logging, pipeline, PipelineConfig};

fn main() {
    logging::init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = PipelineConfig::from_env().context("loading configuration")?;
    let report = pipeline::run_normalize(&config)
        .with_context(|| format!("normalizing logs in {}", config.paths.data_dir.display()))?;

    println!("=== Normalize ===");
    println!("{}", report);
    Ok(())
}
