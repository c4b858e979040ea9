//! Attack-pattern corpus generator
//!
//! Writes `prepared/corpus_passages.json`.
//! Usage: cargo run --bin build_corpus

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
    let report = pipeline::run_build_corpus(&config).context("building corpus")?;

    println!("=== Corpus ===");
    println!("{}", report);
    Ok(())
}
