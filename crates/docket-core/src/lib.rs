//! # Docket Core
//!
//! Retrieval and evaluation library for a corpus of legal advisory opinions.
//!
//! This crate holds the indexes, the retrieval engines and the IR scorer
//! shared by the `docket` search CLI and the `docket-eval` harness.
//!
//! ## Modules
//!
//! - [`corpus`] - Opinion documents and corpus loading
//! - [`search`] - BM25, multi-view semantic and citation indexes, plus the engines that fuse them
//! - [`embedding`] - Embedding capability trait and implementations
//! - [`processing`] - Batched, resumable embedding of the corpus
//! - [`storage`] - Persistence of built indexes
//! - [`evaluation`] - Graded relevance metrics, the scorer and run comparison
//! - [`config`] - Tunables and their defaults
//! - [`metrics`] - Query path counters and rolling latencies
//! - [`error`] - Error types

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod evaluation;
mod hash;
pub mod metrics;
pub mod processing;
pub mod search;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::EngineConfig;
pub use corpus::{load_corpus, Opinion, TextField};
pub use error::{ConfigError, CorpusError, EmbeddingError, SearchError};
pub use search::{DocId, Retrieval, SearchOutcome, SearchPath};
