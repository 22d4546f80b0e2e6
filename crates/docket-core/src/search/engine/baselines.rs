//! Comparison engines.
//!
//! Each engine isolates one idea so the evaluation harness can measure it
//! against [`CitationFusionEngine`](super::CitationFusionEngine):
//!
//! - [`Bm25Engine`]: lexical only
//! - [`SemanticEngine`]: embeddings only
//! - [`HybridRrfEngine`]: rank-based fusion
//! - [`ScoreFusionEngine`]: score-based fusion without a citation pool
//! - [`CitationBoostEngine`]: lexical with additive citation and topic boosts

use super::{record, IndexSet, Retrieval};
use crate::config::FusionConfig;
use crate::error::SearchError;
use crate::metrics::{elapsed_ms, global_metrics, SearchMetrics};
use crate::search::citation::{parse_citations, Citation, CitationKind};
use crate::search::fusion::{
    circuit_breaker_ratio, dedupe_ranked, min_max_normalize, sort_ranked, weighted_rrf,
};
use crate::search::tokenize::tokenize;
use crate::search::topic::infer_topic;
use crate::search::types::{DocId, RankedDoc, ScoredDoc, SearchOutcome, SearchPath};
use async_trait::async_trait;
use instant::Instant;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Candidates taken from each arm by the unpooled fusion engines.
const ARM_CANDIDATES: usize = 100;

/// Boost per exact citation match, times `ln(N / df)`.
const EXACT_CITATION_WEIGHT: f32 = 1.0;
/// Boost per base-only citation match, times `ln(N / df)`.
const BASE_CITATION_WEIGHT: f32 = 0.2;
/// Citation boost scale relative to the best BM25 score.
const CITATION_BOOST_SCALE: f32 = 0.30;
/// Topic boost scale relative to the best BM25 score.
const TOPIC_BOOST_SCALE: f32 = 0.03;

fn lexical_docs(docs: Vec<ScoredDoc>) -> Vec<RankedDoc> {
    docs.into_iter()
        .map(|d| RankedDoc {
            lexical: Some(d.score),
            ..RankedDoc::new(d.id, d.score)
        })
        .collect()
}

fn outcome(path: SearchPath, results: Vec<RankedDoc>) -> SearchOutcome {
    SearchOutcome {
        path,
        pool_size: 0,
        citations: Vec::new(),
        results,
    }
}

// =============================================================================
// BM25
// =============================================================================

/// Plain BM25 over the configured text field.
pub struct Bm25Engine {
    index: Arc<IndexSet>,
    metrics: SearchMetrics,
}

impl Bm25Engine {
    pub fn new(index: Arc<IndexSet>) -> Self {
        Self {
            index,
            metrics: global_metrics().clone(),
        }
    }

    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl Retrieval for Bm25Engine {
    fn name(&self) -> &str {
        "bm25"
    }

    async fn explain(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let tokens = tokenize(query);
        let result = if tokens.is_empty() {
            SearchOutcome::empty()
        } else {
            let hits = self.index.lexical().top_k(&tokens, top_k);
            self.metrics.record_lexical(elapsed_ms(started));
            outcome(SearchPath::LexicalOnly, lexical_docs(hits))
        };
        record(&self.metrics, &result, started);
        Ok(result)
    }
}

// =============================================================================
// Semantic
// =============================================================================

/// Cosine similarity over the embedded views, combined by the index's
/// [`ViewPolicy`](crate::config::ViewPolicy).
///
/// There is no lexical arm to fall back on, so embedding failures are
/// returned as errors.
pub struct SemanticEngine {
    index: Arc<IndexSet>,
    metrics: SearchMetrics,
}

impl SemanticEngine {
    pub fn new(index: Arc<IndexSet>) -> Self {
        Self {
            index,
            metrics: global_metrics().clone(),
        }
    }

    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl Retrieval for SemanticEngine {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn explain(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        if query.trim().is_empty() {
            let result = SearchOutcome::empty();
            record(&self.metrics, &result, started);
            return Ok(result);
        }

        let timeout = self.index.config().fusion.embed_timeout();
        let query_vec = self.index.embed_query(query, timeout).await?;
        self.metrics.record_query_embed(elapsed_ms(started));

        let results = self
            .index
            .semantic()
            .top_k(&query_vec, top_k)
            .into_iter()
            .map(|d| RankedDoc {
                semantic: Some(d.score),
                ..RankedDoc::new(d.id, d.score)
            })
            .collect();
        let result = outcome(SearchPath::SemanticOnly, results);
        record(&self.metrics, &result, started);
        Ok(result)
    }
}

// =============================================================================
// Weighted RRF
// =============================================================================

/// Weighted reciprocal rank fusion of the BM25 and semantic top lists.
///
/// Rank fusion ignores score magnitudes, so a dominant lexical match counts
/// for no more than any other rank-1 hit.
pub struct HybridRrfEngine {
    index: Arc<IndexSet>,
    metrics: SearchMetrics,
}

impl HybridRrfEngine {
    pub fn new(index: Arc<IndexSet>) -> Self {
        Self {
            index,
            metrics: global_metrics().clone(),
        }
    }

    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl Retrieval for HybridRrfEngine {
    fn name(&self) -> &str {
        "hybrid_rrf"
    }

    #[instrument(skip_all, fields(top_k))]
    async fn explain(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let tokens = tokenize(query);
        if tokens.is_empty() {
            let result = SearchOutcome::empty();
            record(&self.metrics, &result, started);
            return Ok(result);
        }

        let rrf = self.index.config().rrf;
        let lex = self.index.lexical().top_k(&tokens, rrf.pool_size);
        self.metrics.record_lexical(elapsed_ms(started));
        let ratio = circuit_breaker_ratio(lex.iter().map(|d| d.score));

        let embed_started = Instant::now();
        let timeout = self.index.config().fusion.embed_timeout();
        let result = match self.index.embed_query(query, timeout).await {
            Ok(query_vec) => {
                self.metrics.record_query_embed(elapsed_ms(embed_started));
                let fusion_started = Instant::now();
                let sem = self.index.semantic().top_k(&query_vec, rrf.pool_size);
                let mut results = weighted_rrf(
                    &lex,
                    &sem,
                    rrf.k,
                    rrf.lexical_weight,
                    rrf.semantic_weight,
                );
                results.truncate(top_k);
                self.metrics.record_fusion(elapsed_ms(fusion_started));
                outcome(SearchPath::Fused { ratio }, results)
            }
            Err(e) => {
                warn!(error = %e, "Query embedding failed, using BM25 ranking");
                let mut results = lexical_docs(lex);
                results.truncate(top_k);
                outcome(
                    SearchPath::Degraded {
                        reason: e.to_string(),
                    },
                    results,
                )
            }
        };
        record(&self.metrics, &result, started);
        Ok(result)
    }
}

// =============================================================================
// Unpooled score fusion
// =============================================================================

/// Min-max score fusion over the BM25 and semantic top lists, with the
/// circuit breaker but no citation pool.
pub struct ScoreFusionEngine {
    index: Arc<IndexSet>,
    fusion: FusionConfig,
    metrics: SearchMetrics,
}

impl ScoreFusionEngine {
    /// Equal-weight blend; the breaker threshold and timeout come from the
    /// index set's fusion settings.
    pub fn new(index: Arc<IndexSet>) -> Self {
        let configured = index.config().fusion;
        let fusion = FusionConfig {
            cb_threshold: configured.cb_threshold,
            embed_timeout_ms: configured.embed_timeout_ms,
            ..FusionConfig::non_citation_blend()
        };
        Self {
            index,
            fusion,
            metrics: global_metrics().clone(),
        }
    }

    pub fn with_fusion(mut self, fusion: FusionConfig) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

#[async_trait]
impl Retrieval for ScoreFusionEngine {
    fn name(&self) -> &str {
        "score_fusion"
    }

    #[instrument(skip_all, fields(top_k))]
    async fn explain(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let tokens = tokenize(query);
        let lex = if tokens.is_empty() {
            Vec::new()
        } else {
            self.index.lexical().top_k(&tokens, ARM_CANDIDATES)
        };
        self.metrics.record_lexical(elapsed_ms(started));
        if lex.is_empty() {
            let result = SearchOutcome::empty();
            record(&self.metrics, &result, started);
            return Ok(result);
        }

        let ratio = circuit_breaker_ratio(lex.iter().map(|d| d.score));
        if ratio >= self.fusion.cb_threshold {
            let mut results = lexical_docs(lex);
            results.truncate(top_k);
            let result = outcome(SearchPath::CircuitBreaker { ratio }, results);
            record(&self.metrics, &result, started);
            return Ok(result);
        }

        let embed_started = Instant::now();
        let query_vec = match self
            .index
            .embed_query(query, self.fusion.embed_timeout())
            .await
        {
            Ok(v) => {
                self.metrics.record_query_embed(elapsed_ms(embed_started));
                v
            }
            Err(e) => {
                warn!(error = %e, "Query embedding failed, using BM25 ranking");
                let mut results = lexical_docs(lex);
                results.truncate(top_k);
                let result = outcome(
                    SearchPath::Degraded {
                        reason: e.to_string(),
                    },
                    results,
                );
                record(&self.metrics, &result, started);
                return Ok(result);
            }
        };

        let fusion_started = Instant::now();
        let sem = self.index.semantic().top_k(&query_vec, ARM_CANDIDATES);
        let lex_raw: HashMap<DocId, f32> = lex.into_iter().map(|d| (d.id, d.score)).collect();
        let sem_raw: HashMap<DocId, f32> = sem.into_iter().map(|d| (d.id, d.score)).collect();
        let lex_norm = min_max_normalize(&lex_raw);
        let sem_norm = min_max_normalize(&sem_raw);

        let candidates: BTreeSet<&DocId> = lex_raw.keys().chain(sem_raw.keys()).collect();
        let mut results: Vec<RankedDoc> = candidates
            .into_iter()
            .map(|id| {
                // An arm that did not retrieve the document contributes 0.
                let score = self.fusion.lexical_weight * lex_norm.get(id).copied().unwrap_or(0.0)
                    + self.fusion.semantic_weight * sem_norm.get(id).copied().unwrap_or(0.0);
                RankedDoc {
                    id: id.clone(),
                    score,
                    lexical: lex_raw.get(id).copied(),
                    semantic: sem_raw.get(id).copied(),
                }
            })
            .collect();
        sort_ranked(&mut results);
        let mut results = dedupe_ranked(results);
        results.truncate(top_k);
        self.metrics.record_fusion(elapsed_ms(fusion_started));

        let result = outcome(SearchPath::Fused { ratio }, results);
        record(&self.metrics, &result, started);
        Ok(result)
    }
}

// =============================================================================
// Citation boost
// =============================================================================

/// BM25 plus additive boosts for opinions citing the query's citations and
/// for opinions in the query's inferred topic.
///
/// Boosts scale with the best BM25 score of the query, so they stay
/// comparable across queries of different lengths:
///
/// ```text
/// final = bm25 + max_bm25 * 0.30 * citation_boost + max_bm25 * 0.03 * topic_hit
/// ```
///
/// where each citation adds `1.0 * ln(N / df)` to its exact matches and
/// `0.2 * ln(N / df)` to matches found only through the base section.
pub struct CitationBoostEngine {
    index: Arc<IndexSet>,
    metrics: SearchMetrics,
}

impl CitationBoostEngine {
    pub fn new(index: Arc<IndexSet>) -> Self {
        Self {
            index,
            metrics: global_metrics().clone(),
        }
    }

    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Per-document citation boost for the query's citations.
    fn citation_boosts(&self, citations: &[Citation], n: usize) -> HashMap<DocId, f32> {
        let index = self.index.citations();
        let mut boosts: HashMap<DocId, f32> = HashMap::new();

        let idf = |df: usize| -> f32 {
            if df == 0 {
                0.0
            } else {
                (n as f32 / df as f32).ln()
            }
        };
        let mut add = |ids: &BTreeSet<DocId>, skip: Option<&BTreeSet<DocId>>, weight: f32| {
            let value = weight * idf(ids.len());
            for id in ids {
                if skip.is_some_and(|s| s.contains(id)) {
                    continue;
                }
                *boosts.entry(id.clone()).or_insert(0.0) += value;
            }
        };

        for c in citations {
            match c.kind {
                CitationKind::Statute => {
                    let exact = index.statute_exact(&c.raw);
                    add(exact, None, EXACT_CITATION_WEIGHT);
                    add(index.statute_base(&c.base), Some(exact), BASE_CITATION_WEIGHT);
                }
                CitationKind::Regulation => {
                    let exact = index.regulation_exact(&c.raw);
                    add(exact, None, EXACT_CITATION_WEIGHT);
                    if c.has_subsection() {
                        add(
                            index.regulation_exact(&c.base),
                            Some(exact),
                            BASE_CITATION_WEIGHT,
                        );
                    }
                }
            }
        }

        boosts
    }
}

#[async_trait]
impl Retrieval for CitationBoostEngine {
    fn name(&self) -> &str {
        "citation_boost"
    }

    #[instrument(skip_all, fields(top_k))]
    async fn explain(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let tokens = tokenize(query);
        if tokens.is_empty() {
            let result = SearchOutcome::empty();
            record(&self.metrics, &result, started);
            return Ok(result);
        }

        let lexical = self.index.lexical();
        let bm25 = lexical.score_all(&tokens);
        self.metrics.record_lexical(elapsed_ms(started));
        let max_bm25 = bm25.iter().copied().fold(0.0f32, f32::max);
        if max_bm25 <= 0.0 {
            let result = outcome(SearchPath::LexicalOnly, Vec::new());
            record(&self.metrics, &result, started);
            return Ok(result);
        }

        let citations = parse_citations(query);
        let boosts = self.citation_boosts(&citations, lexical.len());
        let topic = infer_topic(query, &citations);
        let topic_members = topic.map(|t| self.index.citations().topic(t));
        debug!(?topic, boosted = boosts.len(), "Citation boosts computed");

        let mut results: Vec<RankedDoc> = bm25
            .iter()
            .enumerate()
            .filter_map(|(pos, &score)| {
                let id = &lexical.ids()[pos];
                let boost = boosts.get(id).copied().unwrap_or(0.0);
                let topic_hit = match topic_members {
                    Some(members) if members.contains(id) => 1.0,
                    _ => 0.0,
                };
                let total = score
                    + max_bm25 * CITATION_BOOST_SCALE * boost
                    + max_bm25 * TOPIC_BOOST_SCALE * topic_hit;
                (total > 0.0).then(|| RankedDoc {
                    lexical: Some(score),
                    ..RankedDoc::new(id.clone(), total)
                })
            })
            .collect();
        sort_ranked(&mut results);
        results.truncate(top_k);

        let result = SearchOutcome {
            path: SearchPath::LexicalOnly,
            pool_size: 0,
            citations: citations.iter().map(|c| c.to_string()).collect(),
            results,
        };
        record(&self.metrics, &result, started);
        Ok(result)
    }
}
