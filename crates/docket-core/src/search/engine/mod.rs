//! Retrieval engines.
//!
//! Every engine implements [`Retrieval`] and is composed from the same
//! immutable [`IndexSet`]; engines differ only in how they combine its
//! signals.
//!
//! | Engine | Ranking |
//! |--------|---------|
//! | [`Bm25Engine`] | BM25 top-k |
//! | [`SemanticEngine`] | policy-combined cosine top-k |
//! | [`HybridRrfEngine`] | weighted RRF of BM25 and semantic top-100 |
//! | [`ScoreFusionEngine`] | unpooled min-max fusion with circuit breaker |
//! | [`CitationBoostEngine`] | BM25 plus citation and topic boosts |
//! | [`CitationFusionEngine`] | citation pool, circuit breaker, min-max fusion |

mod baselines;
mod citation_fusion;
mod index_set;

#[cfg(test)]
mod tests;

pub use baselines::{
    Bm25Engine, CitationBoostEngine, HybridRrfEngine, ScoreFusionEngine, SemanticEngine,
};
pub use citation_fusion::CitationFusionEngine;
pub use index_set::IndexSet;

use crate::error::SearchError;
use crate::metrics::{elapsed_ms, SearchMetrics};
use crate::search::types::{DocId, SearchOutcome};
use async_trait::async_trait;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A ranked-retrieval engine.
///
/// # Examples
///
/// ```ignore
/// let engine: Box<dyn Retrieval> = build_engine(EngineKind::Bm25, index);
/// let ids = engine.search("gift limits", 10).await?;
/// ```
#[async_trait]
pub trait Retrieval: Send + Sync {
    /// Short identifier used in reports.
    fn name(&self) -> &str;

    /// Ranks the corpus for `query` and reports how the ranking was made.
    ///
    /// Results hold at most `top_k` distinct ids, best first.
    async fn explain(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError>;

    /// Ranked document ids for `query`.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DocId>, SearchError> {
        Ok(self.explain(query, top_k).await?.ids())
    }
}

/// Selects one of the engine implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Bm25,
    Semantic,
    HybridRrf,
    ScoreFusion,
    CitationBoost,
    #[default]
    CitationFusion,
}

impl EngineKind {
    pub const ALL: [EngineKind; 6] = [
        EngineKind::Bm25,
        EngineKind::Semantic,
        EngineKind::HybridRrf,
        EngineKind::ScoreFusion,
        EngineKind::CitationBoost,
        EngineKind::CitationFusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Bm25 => "bm25",
            EngineKind::Semantic => "semantic",
            EngineKind::HybridRrf => "hybrid_rrf",
            EngineKind::ScoreFusion => "score_fusion",
            EngineKind::CitationBoost => "citation_boost",
            EngineKind::CitationFusion => "citation_fusion",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        EngineKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = EngineKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown engine `{}` (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Creates the engine `kind` over `index`, configured from the index set's
/// [`EngineConfig`](crate::config::EngineConfig).
pub fn build_engine(kind: EngineKind, index: Arc<IndexSet>) -> Box<dyn Retrieval> {
    match kind {
        EngineKind::Bm25 => Box::new(Bm25Engine::new(index)),
        EngineKind::Semantic => Box::new(SemanticEngine::new(index)),
        EngineKind::HybridRrf => Box::new(HybridRrfEngine::new(index)),
        EngineKind::ScoreFusion => Box::new(ScoreFusionEngine::new(index)),
        EngineKind::CitationBoost => Box::new(CitationBoostEngine::new(index)),
        EngineKind::CitationFusion => Box::new(CitationFusionEngine::new(index)),
    }
}

/// Records the route and total latency of a finished search.
fn record(metrics: &SearchMetrics, outcome: &SearchOutcome, started: Instant) {
    metrics.record_route(&outcome.path);
    metrics.record_search_total(elapsed_ms(started));
}
