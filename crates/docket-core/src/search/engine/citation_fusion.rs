//! Citation-aware fusion engine.
//!
//! Per query:
//!
//! 1. **Classify**: a query without usable terms returns nothing; a query
//!    without citations is ranked by BM25 alone
//! 2. **Pool**: opinions matching a parsed citation, plus the BM25 top
//!    `lexical_pool_size`
//! 3. **Circuit breaker**: if the best BM25 score in the pool is at least
//!    `cb_threshold` times the runner-up, the pool is ranked by BM25 and the
//!    query is never embedded
//! 4. **Fuse**: min-max normalize BM25 and semantic scores over the pool and
//!    blend them with the configured weights
//!
//! An embedding failure or timeout in step 4 degrades to the BM25 ranking of
//! the pool.

use super::{record, IndexSet, Retrieval};
use crate::config::FusionConfig;
use crate::error::SearchError;
use crate::metrics::{elapsed_ms, global_metrics, SearchMetrics};
use crate::search::citation::{parse_citations, Citation};
use crate::search::fusion::{
    circuit_breaker_ratio, dedupe_ranked, min_max_normalize, sort_ranked, sort_scored,
};
use crate::search::tokenize::tokenize;
use crate::search::types::{DocId, RankedDoc, ScoredDoc, SearchOutcome, SearchPath};
use async_trait::async_trait;
use instant::Instant;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Production engine: citation pooling, circuit breaker, min-max fusion.
pub struct CitationFusionEngine {
    index: Arc<IndexSet>,
    fusion: FusionConfig,
    metrics: SearchMetrics,
}

impl CitationFusionEngine {
    /// Creates the engine with the index set's fusion settings.
    pub fn new(index: Arc<IndexSet>) -> Self {
        let fusion = index.config().fusion;
        Self {
            index,
            fusion,
            metrics: global_metrics().clone(),
        }
    }

    /// Overrides the fusion settings (weights, threshold, pool size).
    pub fn with_fusion(mut self, fusion: FusionConfig) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn fusion(&self) -> &FusionConfig {
        &self.fusion
    }

    /// BM25 top-k for citation-free queries.
    fn lexical_only(&self, tokens: &[String], top_k: usize) -> SearchOutcome {
        let results = self
            .index
            .lexical()
            .top_k(tokens, top_k)
            .into_iter()
            .map(|doc| RankedDoc {
                lexical: Some(doc.score),
                ..RankedDoc::new(doc.id, doc.score)
            })
            .collect();
        SearchOutcome {
            path: SearchPath::LexicalOnly,
            pool_size: 0,
            citations: Vec::new(),
            results,
        }
    }

    /// Citation matches plus the positive BM25 top `lexical_pool_size`.
    fn build_pool(&self, citations: &[Citation], bm25: &[f32]) -> BTreeSet<DocId> {
        let lexical = self.index.lexical();
        let pool = self.index.citations().pool(citations);
        if pool.base_only > 0 {
            // Opinions whose extracted citations stop at the base section
            debug!(
                base_only = pool.base_only,
                "Citation matches reached only through base keys"
            );
        }

        let mut members = pool.ids;
        let mut ranked: Vec<ScoredDoc> = bm25
            .iter()
            .enumerate()
            .filter(|(_, s)| **s > 0.0)
            .map(|(pos, &score)| ScoredDoc {
                id: lexical.ids()[pos].clone(),
                score,
            })
            .collect();
        sort_scored(&mut ranked);
        members.extend(
            ranked
                .into_iter()
                .take(self.fusion.lexical_pool_size)
                .map(|doc| doc.id),
        );
        members
    }
}

/// Ranks pool members by raw BM25 score.
fn lexical_ranking(lex: &HashMap<DocId, f32>, top_k: usize) -> Vec<RankedDoc> {
    let mut results: Vec<RankedDoc> = lex
        .iter()
        .map(|(id, &score)| RankedDoc {
            lexical: Some(score),
            ..RankedDoc::new(id.clone(), score)
        })
        .collect();
    sort_ranked(&mut results);
    results.truncate(top_k);
    results
}

#[async_trait]
impl Retrieval for CitationFusionEngine {
    fn name(&self) -> &str {
        "citation_fusion"
    }

    #[instrument(skip_all, fields(top_k))]
    async fn explain(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let tokens = tokenize(query);
        if tokens.is_empty() {
            let outcome = SearchOutcome::empty();
            record(&self.metrics, &outcome, started);
            return Ok(outcome);
        }

        let citations = parse_citations(query);
        if citations.is_empty() {
            let lex_started = Instant::now();
            let outcome = self.lexical_only(&tokens, top_k);
            self.metrics.record_lexical(elapsed_ms(lex_started));
            record(&self.metrics, &outcome, started);
            return Ok(outcome);
        }

        let lexical = self.index.lexical();
        let lex_started = Instant::now();
        let bm25 = lexical.score_all(&tokens);
        let members = self.build_pool(&citations, &bm25);
        self.metrics.record_lexical(elapsed_ms(lex_started));

        let pool_size = members.len();
        if pool_size > self.fusion.large_pool_warning {
            warn!(
                pool_size,
                limit = self.fusion.large_pool_warning,
                "Large citation pool, precision may suffer"
            );
        }

        let lex: HashMap<DocId, f32> = members
            .into_iter()
            .map(|id| {
                let score = lexical.position(id.as_str()).map_or(0.0, |p| bm25[p]);
                (id, score)
            })
            .collect();

        let ratio = circuit_breaker_ratio(lex.values().copied());
        let citation_keys: Vec<String> = citations.iter().map(|c| c.to_string()).collect();
        debug!(pool_size, ratio, citations = ?citation_keys, "Citation pool built");

        if ratio >= self.fusion.cb_threshold {
            let outcome = SearchOutcome {
                path: SearchPath::CircuitBreaker { ratio },
                pool_size,
                citations: citation_keys,
                results: lexical_ranking(&lex, top_k),
            };
            record(&self.metrics, &outcome, started);
            return Ok(outcome);
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
                warn!(error = %e, "Query embedding failed, using lexical ranking of the pool");
                let outcome = SearchOutcome {
                    path: SearchPath::Degraded {
                        reason: e.to_string(),
                    },
                    pool_size,
                    citations: citation_keys,
                    results: lexical_ranking(&lex, top_k),
                };
                record(&self.metrics, &outcome, started);
                return Ok(outcome);
            }
        };

        let fusion_started = Instant::now();
        let all_semantic = self.index.semantic().scores(&query_vec);
        let sem: HashMap<DocId, f32> = lex
            .keys()
            .map(|id| (id.clone(), all_semantic.get(id).copied().unwrap_or(0.0)))
            .collect();

        let lex_norm = min_max_normalize(&lex);
        let sem_norm = min_max_normalize(&sem);

        let mut results: Vec<RankedDoc> = lex
            .iter()
            .map(|(id, &raw_lex)| {
                let fused = self.fusion.lexical_weight * lex_norm[id]
                    + self.fusion.semantic_weight * sem_norm[id];
                RankedDoc {
                    id: id.clone(),
                    score: fused,
                    lexical: Some(raw_lex),
                    semantic: Some(sem[id]),
                }
            })
            .collect();
        sort_ranked(&mut results);
        let mut results = dedupe_ranked(results);
        results.truncate(top_k);
        self.metrics.record_fusion(elapsed_ms(fusion_started));

        let outcome = SearchOutcome {
            path: SearchPath::Fused { ratio },
            pool_size,
            citations: citation_keys,
            results,
        };
        record(&self.metrics, &outcome, started);
        Ok(outcome)
    }
}
