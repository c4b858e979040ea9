//! Vector index builder
//!
//! Embeds the corpus, writes `prepared/faiss_index.bin` and `prepared/faiss_meta.json`.
//! Usage: cargo run --bin build_index

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
    let report = pipeline::run_build_index(&config).await.context("building index")?;

    println!("=== Index ===");
    println!("{}", report);
    Ok(())
}
