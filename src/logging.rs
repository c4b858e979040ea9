//! Logging setup shared by the stage binaries
//!
//! Logs go to stderr; stdout is reserved for the stage summary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` selects the filter (default `info`); `AUTHRAG_DEBUG=1` forces
/// `debug`.
pub fn init() {
    let debug = std::env::var("AUTHRAG_DEBUG")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
