//! Type definitions for the authrag classification pipeline
//!
//! ## Stage Flow
//!
//! ```text
//! data/*.json[l] ─→ normalizer ─→ EventSummary ─┐
//!                                               ├─→ retriever ─→ classifier ─→ Verdict
//! corpus builder ─→ Passage ─→ indexer ─────────┘
//! ```
//!
//! ## Key Types
//!
//! - [`EventSummary`] - flat per-event summary with a fully populated [`FeatureVector`]
//! - [`Passage`] - labeled attack-pattern description from the curated corpus
//! - [`Verdict`] - structured classification result
//! - [`Label`] - closed set of attack categories

pub mod event;
pub mod label;
pub mod passage;
pub mod verdict;

pub use event::{EventSummary, FeatureVector, RawLogRecord, RecentEvent, RecordId};
pub use label::Label;
pub use passage::Passage;
pub use verdict::{Verdict, MAX_INDICATORS};
