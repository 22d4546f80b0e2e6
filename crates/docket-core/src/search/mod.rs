//! Hybrid retrieval over the opinion corpus.
//!
//! This module combines three signals into one ranking:
//! - **Lexical** (BM25 Okapi over a legal-aware tokenizer)
//! - **Semantic** (cosine similarity over one or more embedded views)
//! - **Citation** (statute and regulation references parsed from the query,
//!   matched against each opinion's structured citations)
//!
//! # Architecture
//!
//! - `types`: Core types (DocId, View, RankedDoc, SearchPath, SearchOutcome)
//! - `tokenize`: Query and document tokenizer shared by BM25 and the hashing
//!   embedder
//! - `keyword`: BM25 lexical index
//! - `vector`: Multi-view semantic index with view-combination policies
//! - `citation`: Citation parser and citation inverted index
//! - `topic`: Query topic inference from citations and keywords
//! - `fusion`: Min-max normalization, circuit breaker ratio, weighted RRF
//! - `engine`: The [`IndexSet`] and the [`Retrieval`] implementations
//!
//! # Usage
//!
//! ```ignore
//! use docket_core::search::{build_engine, EngineKind, IndexSet};
//!
//! let index = Arc::new(IndexSet::open_or_build(&opinions, &store, embedder, config, false, |_| {}).await?);
//! let engine = build_engine(EngineKind::CitationFusion, index);
//!
//! let outcome = engine.explain("Section 87103(a) disqualification", 10).await?;
//! println!("{} via {}", outcome.results.len(), outcome.path.label());
//! ```
//!
//! # Algorithm Details
//!
//! **Citation fusion** (the default engine):
//! - Queries without citations are ranked lexically
//! - Otherwise a candidate pool is built from citation matches plus the
//!   lexical top 100
//! - If the lexical leader dominates the pool (top1 / top2 >= 1.3) the pool
//!   is ranked lexically and the semantic arm is skipped
//! - Otherwise both arms are min-max normalized over the pool and blended
//!   0.4 lexical / 0.6 semantic

pub mod citation;
pub mod engine;
pub mod fusion;
pub mod keyword;
pub mod tokenize;
pub mod topic;
pub mod types;
pub mod vector;

pub use citation::{parse_citations, Citation, CitationIndex, CitationKind};
pub use engine::{
    build_engine, Bm25Engine, CitationBoostEngine, CitationFusionEngine, EngineKind,
    HybridRrfEngine, IndexSet, Retrieval, ScoreFusionEngine, SemanticEngine,
};
pub use keyword::{LexicalIndex, TextQuality};
pub use tokenize::tokenize;
pub use types::{DocId, RankedDoc, ScoredDoc, SearchOutcome, SearchPath, View};
pub use vector::{SemanticIndex, ViewVectors};
