//! Prompt builder
//!
//! Retrieves passages for each event and writes `prepared/prompts/prompt_{id}.txt`.
//! Usage: cargo run --bin build_prompts

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
    let report = pipeline::run_build_prompts(&config).await.context("building prompts")?;

    println!("=== Prompts ===");
    println!("{}", report);
    Ok(())
}
