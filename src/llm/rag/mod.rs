//! Retrieval-Augmented Generation (RAG)
//!
//! Indexes the attack-pattern corpus and retrieves the passages most
//! relevant to an event for the classification prompt.

mod indexer;
mod retriever;
mod vectorstore;

pub use indexer::{build_store, IndexReport, EMBED_BATCH_SIZE};
pub use retriever::{event_query, expand_query, lexical_rank, Retriever, RetrievalError, EXPANSION_KEYWORDS};
pub use vectorstore::{l2_normalize, FlatIndex, Metric, SearchResult, VectorStore};
