//! Hybrid retrieval for the casegraph evidence store.
//!
//! Merges a semantic-similarity result set and a structured filter result
//! set into one ranked, deduplicated, time-filtered response with merge
//! diagnostics. The semantic side is pluggable through [`SemanticIndex`];
//! [`lexical::LexicalIndex`] is the in-process fallback when no vector
//! backend is deployed.

pub mod error;
pub mod lexical;
pub mod merge;
pub mod service;

pub use error::{Error, Result};
pub use merge::MergeWeights;
pub use service::{HybridSearchService, SearchConfig, SemanticIndex};
