//! Pipeline error types
//!
//! Only the fatal kinds surface here. Malformed input and value coercion
//! problems are logged and counted by the stage that meets them; transport
//! and schema failures of the LLM are folded into the fallback verdict.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Fatal pipeline errors (process exits non-zero)
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A persisted artifact required by the stage is absent
    #[error("Required resource missing: {}", path.display())]
    ResourceMissing { path: PathBuf },

    /// The input directory holds no usable records
    #[error("No JSON/JSONL records found in {}", dir.display())]
    EmptyInput { dir: PathBuf },

    /// Missing credentials, unknown backend name, unparsable setting
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Index and metadata disagree, or the index file is damaged
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Embedding service failure while building or querying the index
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return PipelineError::ResourceMissing {
                path: path.to_path_buf(),
            };
        }
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        PipelineError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
