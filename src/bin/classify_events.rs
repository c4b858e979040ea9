//! Event classifier
//!
//! Classifies every normalized event and writes `prepared/verdicts.json`.
//! Usage: AUTHRAG_LLM_API_KEY=... cargo run --bin classify_events

use anyhow::{Context, Result};
use authrag::{logging, pipeline, PipelineConfig};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = PipelineConfig::from_env().context("loading configuration")?;
    let report = pipeline::run_classify(&config).await.context("classifying events")?;

    println!("=== Classification ===");
    println!("{}", report);
    Ok(())
}
