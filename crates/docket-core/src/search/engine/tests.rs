//! Tests for the retrieval engines and the index set.

use super::*;
use crate::config::{EngineConfig, FusionConfig};
use crate::corpus::Opinion;
use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::EmbeddingError;
use crate::search::types::{SearchPath, View};
use crate::search::vector::view_text;
use crate::storage::{InMemoryIndexStore, IndexStore, MANIFEST_BLOB};
use crate::test_utils::{OpinionBuilder, ScriptedEmbedder};
use std::collections::HashSet;
use std::time::Duration;

const DIM: usize = 256;

fn corpus() -> Vec<Opinion> {
    vec![
        OpinionBuilder::new("A-01")
            .text("Disqualification under Section 87103(a) applies when an official has a financial interest in a business entity affected by the decision.")
            .facts("A council member owns stock in a developer seeking a permit.")
            .statutes(&["87103(a)"])
            .topic("conflicts_of_interest")
            .build(),
        OpinionBuilder::new("A-02")
            .text("An official with a financial interest in real property must consider disqualification under Section 87103(b) before voting on the zoning change.")
            .statutes(&["87103(b)"])
            .topic("conflicts_of_interest")
            .build(),
        OpinionBuilder::new("A-03")
            .text("The official's financial interest in a source of income triggers the disqualification rules of Section 87103 for the contract award.")
            .analysis("The income exceeded the threshold, so the official is disqualified.")
            .statutes(&["87103"])
            .topic("conflicts_of_interest")
            .build(),
        OpinionBuilder::new("A-04")
            .text("Regulation 18702.2 describes the materiality standard for a financial interest in real property near the project.")
            .regulations(&["18702.2"])
            .topic("conflicts_of_interest")
            .build(),
        OpinionBuilder::new("A-05")
            .text("Gift limits apply to payments received by a planning commissioner from a lobbying firm, including travel payments.")
            .statutes(&["89503"])
            .topic("gifts_honoraria")
            .build(),
        OpinionBuilder::new("A-06")
            .text("Campaign contributions received by a candidate committee must be reported on the semi-annual statement.")
            .facts("The committee received contributions after the election.")
            .statutes(&["84200"])
            .topic("campaign_finance")
            .build(),
        OpinionBuilder::new("A-07")
            .text("A lobbyist employer must register and file quarterly reports of lobbying activity with the state.")
            .statutes(&["86100"])
            .topic("lobbying")
            .build(),
        OpinionBuilder::new("A-08")
            .text("General ethics standards for public officials are summarized here for training purposes.")
            .build(),
    ]
}

fn small_batches() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.embedding.batch_size = 2;
    config
}

async fn build_index(embedder: Arc<dyn Embedder>) -> Arc<IndexSet> {
    let store = InMemoryIndexStore::new();
    let index = IndexSet::open_or_build(
        &corpus(),
        &store,
        embedder,
        EngineConfig::default(),
        false,
        |_| {},
    )
    .await
    .unwrap();
    Arc::new(index)
}

async fn hashing_index() -> Arc<IndexSet> {
    build_index(Arc::new(HashingEmbedder::new(DIM))).await
}

/// Same indexes, but queries go through `embedder`.
fn with_query_embedder(index: &IndexSet, embedder: Arc<dyn Embedder>) -> Arc<IndexSet> {
    Arc::new(IndexSet::from_parts(
        index.config().clone(),
        index.lexical().clone(),
        index.citations().clone(),
        index.semantic().clone(),
        embedder,
    ))
}

fn fusion_threshold(threshold: f32) -> FusionConfig {
    FusionConfig {
        cb_threshold: threshold,
        ..FusionConfig::default()
    }
}

fn assert_well_formed(outcome: &SearchOutcome, top_k: usize) {
    assert!(outcome.results.len() <= top_k);
    let ids: HashSet<&str> = outcome.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), outcome.results.len(), "duplicate ids in results");
}

/// Text count each build of [`corpus`] embeds across all default views.
fn total_view_texts(opinions: &[Opinion]) -> usize {
    View::ALL
        .iter()
        .map(|&v| opinions.iter().filter(|o| view_text(o, v).is_some()).count())
        .sum()
}

// =============================================================================
// Citation fusion
// =============================================================================

#[tokio::test]
async fn test_query_without_citations_is_lexical_only() {
    let engine = CitationFusionEngine::new(hashing_index().await);
    let outcome = engine.explain("general ethics standards", 10).await.unwrap();

    assert_eq!(outcome.path, SearchPath::LexicalOnly);
    assert!(outcome.citations.is_empty());
    assert_eq!(outcome.pool_size, 0);
    assert_eq!(outcome.results[0].id.as_str(), "A-08");
}

#[tokio::test]
async fn test_stopword_query_is_empty() {
    let engine = CitationFusionEngine::new(hashing_index().await);
    let outcome = engine.explain("the of and", 10).await.unwrap();
    assert_eq!(outcome.path, SearchPath::Empty);
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_citation_query_reports_parsed_citation() {
    let engine = CitationFusionEngine::new(hashing_index().await);
    let outcome = engine
        .explain("Section 87103(a) disqualification", 10)
        .await
        .unwrap();

    assert_eq!(outcome.citations, vec!["§87103(a)".to_string()]);
    // Exact and base matches of 87103 are all in the pool
    let ids = outcome.ids();
    for expected in ["A-01", "A-02", "A-03"] {
        assert!(ids.iter().any(|id| id.as_str() == expected), "{expected} missing");
    }
    assert!(outcome.pool_size >= 3);
    assert_eq!(ids[0].as_str(), "A-01");
    assert_well_formed(&outcome, 10);
}

#[tokio::test]
async fn test_circuit_breaker_fires_at_threshold() {
    let index = hashing_index().await;
    let query = "financial interest disqualification under Section 87103";

    // Threshold never reached: fused, and the ratio is reported
    let fused = CitationFusionEngine::new(index.clone())
        .with_fusion(fusion_threshold(f32::MAX))
        .explain(query, 10)
        .await
        .unwrap();
    let SearchPath::Fused { ratio } = fused.path else {
        panic!("expected fused path, got {:?}", fused.path);
    };
    assert!(ratio.is_finite() && ratio >= 1.0);

    // Ratio just above the threshold (like 1.35 against 1.3): breaker
    let tripped = CitationFusionEngine::new(index.clone())
        .with_fusion(fusion_threshold(ratio - 0.05))
        .explain(query, 10)
        .await
        .unwrap();
    assert!(matches!(tripped.path, SearchPath::CircuitBreaker { .. }));
    assert_eq!(tripped.pool_size, fused.pool_size);
    for pair in tripped.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for doc in &tripped.results {
        assert_eq!(doc.lexical, Some(doc.score));
        assert_eq!(doc.semantic, None);
    }

    // Ratio just below the threshold: fused again
    let below = CitationFusionEngine::new(index)
        .with_fusion(fusion_threshold(ratio + 0.05))
        .explain(query, 10)
        .await
        .unwrap();
    assert!(matches!(below.path, SearchPath::Fused { .. }));
}

#[tokio::test]
async fn test_lexical_routes_never_embed_the_query() {
    let index = hashing_index().await;
    let query = "financial interest disqualification under Section 87103";

    let baseline = CitationFusionEngine::new(index.clone())
        .with_fusion(fusion_threshold(f32::MAX))
        .explain(query, 10)
        .await
        .unwrap();
    let SearchPath::Fused { ratio } = baseline.path else {
        panic!("expected fused path, got {:?}", baseline.path);
    };

    let scripted = Arc::new(ScriptedEmbedder::new(DIM));
    let counted = with_query_embedder(&index, scripted.clone());

    let engine = CitationFusionEngine::new(counted.clone());
    let outcome = engine.explain("general ethics standards", 10).await.unwrap();
    assert_eq!(outcome.path, SearchPath::LexicalOnly);
    let outcome = engine.explain("the of and", 10).await.unwrap();
    assert_eq!(outcome.path, SearchPath::Empty);
    assert_eq!(scripted.calls(), 0);

    let tripped = CitationFusionEngine::new(counted.clone())
        .with_fusion(fusion_threshold(ratio - 0.05))
        .explain(query, 10)
        .await
        .unwrap();
    assert!(matches!(tripped.path, SearchPath::CircuitBreaker { .. }));
    assert_eq!(scripted.calls(), 0);

    let fused = CitationFusionEngine::new(counted)
        .with_fusion(fusion_threshold(f32::MAX))
        .explain(query, 10)
        .await
        .unwrap();
    assert!(matches!(fused.path, SearchPath::Fused { .. }));
    assert_eq!(scripted.calls(), 1);
}

#[tokio::test]
async fn test_circuit_breaker_is_monotonic_in_threshold() {
    let index = hashing_index().await;
    let queries = [
        "Section 87103(a) disqualification",
        "financial interest disqualification under Section 87103",
        "Regulation 18702.2 real property materiality",
        "gift limits Section 89503 travel payments",
        "Section 84200 campaign contributions",
    ];
    let thresholds = [1.0, 1.1, 1.3, 1.5, 2.0, 5.0, 1000.0];

    let mut previous = usize::MAX;
    for threshold in thresholds {
        let engine =
            CitationFusionEngine::new(index.clone()).with_fusion(fusion_threshold(threshold));
        let mut breakers = 0;
        for query in queries {
            let outcome = engine.explain(query, 10).await.unwrap();
            if matches!(outcome.path, SearchPath::CircuitBreaker { .. }) {
                breakers += 1;
            }
        }
        assert!(
            breakers <= previous,
            "raising threshold to {threshold} increased breaker activations"
        );
        previous = breakers;
    }
}

#[tokio::test]
async fn test_embedding_failure_degrades_to_lexical() {
    let index = hashing_index().await;
    let failing = with_query_embedder(&index, Arc::new(ScriptedEmbedder::new(DIM).fail_after(0)));
    let metrics = SearchMetrics::new();
    let engine = CitationFusionEngine::new(failing)
        .with_fusion(fusion_threshold(f32::MAX))
        .with_metrics(metrics.clone());

    let outcome = engine
        .explain("financial interest disqualification under Section 87103", 5)
        .await
        .unwrap();

    let SearchPath::Degraded { reason } = &outcome.path else {
        panic!("expected degraded path, got {:?}", outcome.path);
    };
    assert!(reason.contains("scripted failure"));
    assert!(!outcome.results.is_empty());
    for pair in outcome.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(metrics.snapshot().routes.degraded, 1);
}

#[tokio::test]
async fn test_embedding_timeout_degrades_to_lexical() {
    let index = hashing_index().await;
    let slow = with_query_embedder(
        &index,
        Arc::new(ScriptedEmbedder::new(DIM).with_delay(Duration::from_millis(200))),
    );
    let engine = CitationFusionEngine::new(slow).with_fusion(FusionConfig {
        cb_threshold: f32::MAX,
        embed_timeout_ms: 10,
        ..FusionConfig::default()
    });

    let outcome = engine
        .explain("financial interest disqualification under Section 87103", 5)
        .await
        .unwrap();
    let SearchPath::Degraded { reason } = &outcome.path else {
        panic!("expected degraded path, got {:?}", outcome.path);
    };
    assert!(reason.contains("timed out"));
}

#[tokio::test]
async fn test_query_vector_width_mismatch_degrades() {
    let index = hashing_index().await;
    let narrow = with_query_embedder(&index, Arc::new(HashingEmbedder::new(DIM / 2)));

    let err = narrow
        .embed_query("gift limits", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EmbeddingError::InvalidResponse(_)));

    let outcome = CitationFusionEngine::new(narrow)
        .with_fusion(fusion_threshold(f32::MAX))
        .explain("financial interest disqualification under Section 87103", 5)
        .await
        .unwrap();
    let SearchPath::Degraded { reason } = &outcome.path else {
        panic!("expected degraded path, got {:?}", outcome.path);
    };
    assert!(reason.contains("dimension"));
    assert!(!outcome.results.is_empty());
}

#[tokio::test]
async fn test_fused_results_carry_both_arms() {
    let engine = CitationFusionEngine::new(hashing_index().await)
        .with_fusion(fusion_threshold(f32::MAX));
    let outcome = engine
        .explain("financial interest disqualification under Section 87103", 3)
        .await
        .unwrap();

    assert!(matches!(outcome.path, SearchPath::Fused { .. }));
    assert_well_formed(&outcome, 3);
    for doc in &outcome.results {
        assert!(doc.lexical.is_some());
        assert!(doc.semantic.is_some());
        assert!((0.0..=1.0 + 1e-6).contains(&doc.score));
    }
}

#[tokio::test]
async fn test_search_is_deterministic() {
    let engine = CitationFusionEngine::new(hashing_index().await)
        .with_fusion(fusion_threshold(f32::MAX));
    let query = "financial interest disqualification under Section 87103";
    let first = engine.search(query, 10).await.unwrap();
    let second = engine.search(query, 10).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_routes_are_recorded() {
    let metrics = SearchMetrics::new();
    let engine = CitationFusionEngine::new(hashing_index().await).with_metrics(metrics.clone());

    engine.explain("the", 5).await.unwrap();
    engine.explain("general ethics standards", 5).await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.routes.empty, 1);
    assert_eq!(snapshot.routes.lexical_only, 1);
    assert_eq!(snapshot.search.query_count, 2);
}

// =============================================================================
// Comparison engines
// =============================================================================

#[tokio::test]
async fn test_bm25_engine_positive_scores_only() {
    let engine = Bm25Engine::new(hashing_index().await);
    let outcome = engine.explain("lobbyist quarterly reports", 10).await.unwrap();

    assert_eq!(outcome.path, SearchPath::LexicalOnly);
    assert_eq!(outcome.results[0].id.as_str(), "A-07");
    assert!(outcome.results.iter().all(|r| r.score > 0.0));

    let nothing = engine.explain("zebra", 10).await.unwrap();
    assert!(nothing.results.is_empty());
}

#[tokio::test]
async fn test_semantic_engine_ranks_every_opinion() {
    let engine = SemanticEngine::new(hashing_index().await);
    let outcome = engine.explain("campaign contributions committee", 20).await.unwrap();

    assert_eq!(outcome.path, SearchPath::SemanticOnly);
    assert_eq!(outcome.results.len(), corpus().len());
    assert_eq!(outcome.results[0].id.as_str(), "A-06");
}

#[tokio::test]
async fn test_semantic_engine_propagates_embedding_errors() {
    let index = hashing_index().await;
    let failing = with_query_embedder(&index, Arc::new(ScriptedEmbedder::new(DIM).fail_after(0)));
    let result = SemanticEngine::new(failing).explain("gift limits", 5).await;
    assert!(matches!(result, Err(SearchError::Embedding(_))));
}

#[tokio::test]
async fn test_hybrid_rrf_engine() {
    let engine = HybridRrfEngine::new(hashing_index().await);
    let outcome = engine.explain("gift limits travel payments", 4).await.unwrap();

    assert!(matches!(outcome.path, SearchPath::Fused { .. }));
    assert_well_formed(&outcome, 4);
    assert_eq!(outcome.results[0].id.as_str(), "A-05");
    // RRF scores are bounded by the weight sum over k + 1
    assert!(outcome.results[0].score <= (0.7 + 0.3) / 61.0 + 1e-6);
}

#[tokio::test]
async fn test_hybrid_rrf_degrades_on_failure() {
    let index = hashing_index().await;
    let failing = with_query_embedder(&index, Arc::new(ScriptedEmbedder::new(DIM).fail_after(0)));
    let outcome = HybridRrfEngine::new(failing)
        .explain("gift limits", 4)
        .await
        .unwrap();
    assert!(matches!(outcome.path, SearchPath::Degraded { .. }));
    assert_eq!(outcome.results[0].id.as_str(), "A-05");
}

#[tokio::test]
async fn test_score_fusion_unions_both_arms() {
    let engine =
        ScoreFusionEngine::new(hashing_index().await).with_fusion(FusionConfig {
            cb_threshold: f32::MAX,
            ..FusionConfig::non_citation_blend()
        });
    let outcome = engine
        .explain("financial interest real property", 20)
        .await
        .unwrap();

    assert!(matches!(outcome.path, SearchPath::Fused { .. }));
    assert_well_formed(&outcome, 20);
    // Semantic top-100 covers the whole corpus, so the union does too
    assert_eq!(outcome.results.len(), corpus().len());
    assert!(outcome.results.iter().any(|r| r.lexical.is_none()));
}

#[tokio::test]
async fn test_score_fusion_without_lexical_hits_is_empty() {
    let engine = ScoreFusionEngine::new(hashing_index().await);
    let outcome = engine.explain("zebra", 10).await.unwrap();
    assert_eq!(outcome.path, SearchPath::Empty);
}

#[tokio::test]
async fn test_citation_boost_promotes_cited_opinion() {
    let engine = CitationBoostEngine::new(hashing_index().await);
    let outcome = engine
        .explain("financial interest disqualification Section 87103(b)", 10)
        .await
        .unwrap();

    assert_eq!(outcome.citations, vec!["§87103(b)".to_string()]);
    assert_eq!(outcome.results[0].id.as_str(), "A-02");
    let top = &outcome.results[0];
    assert!(top.score > top.lexical.unwrap_or(0.0));
    assert_well_formed(&outcome, 10);
}

#[tokio::test]
async fn test_citation_boost_requires_lexical_signal() {
    let engine = CitationBoostEngine::new(hashing_index().await);
    let outcome = engine.explain("zebra 89503", 10).await.unwrap();
    // 89503 is not a term of any opinion text, so nothing scores
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_build_engine_names_match_kind() {
    let index = hashing_index().await;
    for kind in EngineKind::ALL {
        let engine = build_engine(kind, index.clone());
        assert_eq!(engine.name(), kind.as_str());
    }
}

#[test]
fn test_engine_kind_from_str() {
    assert_eq!("bm25".parse::<EngineKind>().unwrap(), EngineKind::Bm25);
    assert_eq!(
        "citation-fusion".parse::<EngineKind>().unwrap(),
        EngineKind::CitationFusion
    );
    assert_eq!(" Hybrid_RRF ".parse::<EngineKind>().unwrap(), EngineKind::HybridRrf);
    let err = "rocchio".parse::<EngineKind>().unwrap_err();
    assert!(err.contains("citation_fusion"));
    assert_eq!(EngineKind::default(), EngineKind::CitationFusion);
}

// =============================================================================
// Build-or-load
// =============================================================================

#[tokio::test]
async fn test_open_or_build_loads_matching_index() {
    let store = InMemoryIndexStore::new();
    let opinions = corpus();

    let first = Arc::new(ScriptedEmbedder::new(DIM));
    let built = IndexSet::open_or_build(&opinions, &store, first.clone(), small_batches(), false, |_| {})
        .await
        .unwrap();
    assert!(first.calls() > 0);
    assert!(store.get_blob(MANIFEST_BLOB).await.unwrap().is_some());

    let second = Arc::new(ScriptedEmbedder::new(DIM));
    let loaded =
        IndexSet::open_or_build(&opinions, &store, second.clone(), small_batches(), false, |_| {})
            .await
            .unwrap();
    assert_eq!(second.calls(), 0);
    assert_eq!(loaded.len(), built.len());
    assert_eq!(loaded.semantic().len(), built.semantic().len());

    // Loaded index answers exactly like the freshly built one
    let query = "financial interest disqualification under Section 87103";
    let a = CitationFusionEngine::new(Arc::new(built)).search(query, 10).await.unwrap();
    let b = CitationFusionEngine::new(Arc::new(loaded)).search(query, 10).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_open_or_build_rebuilds_on_config_change() {
    let store = InMemoryIndexStore::new();
    let opinions = corpus();
    IndexSet::open_or_build(
        &opinions,
        &store,
        Arc::new(HashingEmbedder::new(DIM)),
        small_batches(),
        false,
        |_| {},
    )
    .await
    .unwrap();

    let mut changed = small_batches();
    changed.lexical.k1 = 1.2;
    let embedder = Arc::new(ScriptedEmbedder::new(DIM));
    let rebuilt = IndexSet::open_or_build(&opinions, &store, embedder.clone(), changed, false, |_| {})
        .await
        .unwrap();

    assert_eq!(rebuilt.manifest().k1, 1.2);
    assert_eq!(embedder.texts_seen(), total_view_texts(&opinions));
}

#[tokio::test]
async fn test_open_or_build_rebuild_flag_clears_store() {
    let store = InMemoryIndexStore::new();
    let opinions = corpus();
    IndexSet::open_or_build(
        &opinions,
        &store,
        Arc::new(HashingEmbedder::new(DIM)),
        small_batches(),
        false,
        |_| {},
    )
    .await
    .unwrap();

    let embedder = Arc::new(ScriptedEmbedder::new(DIM));
    IndexSet::open_or_build(&opinions, &store, embedder.clone(), small_batches(), true, |_| {})
        .await
        .unwrap();
    assert_eq!(embedder.texts_seen(), total_view_texts(&opinions));
}

#[tokio::test]
async fn test_open_or_build_resumes_interrupted_build() {
    let store = InMemoryIndexStore::new();
    let opinions = corpus();

    let flaky = Arc::new(ScriptedEmbedder::new(DIM).fail_after(1));
    let err = IndexSet::open_or_build(&opinions, &store, flaky, small_batches(), false, |_| {})
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SearchError::Embedding(_)));
    assert!(store.get_blob(MANIFEST_BLOB).await.unwrap().is_none());
    assert_eq!(store.vector_count(View::Qa).await.unwrap(), 2);

    let resumed = Arc::new(ScriptedEmbedder::new(DIM));
    let mut reports = 0;
    let index = IndexSet::open_or_build(&opinions, &store, resumed.clone(), small_batches(), false, |_| {
        reports += 1
    })
    .await
    .unwrap();

    assert_eq!(resumed.texts_seen(), total_view_texts(&opinions) - 2);
    assert!(reports > 0);
    assert_eq!(index.semantic().len(), opinions.len());
}

#[tokio::test]
async fn test_interrupted_build_of_other_inputs_is_discarded() {
    let store = InMemoryIndexStore::new();
    let opinions = corpus();

    let flaky = Arc::new(ScriptedEmbedder::new(DIM).fail_after(1));
    assert!(
        IndexSet::open_or_build(&opinions, &store, flaky, small_batches(), false, |_| {})
            .await
            .is_err()
    );

    let fewer = &opinions[..6];
    let embedder = Arc::new(ScriptedEmbedder::new(DIM));
    IndexSet::open_or_build(fewer, &store, embedder.clone(), small_batches(), false, |_| {})
        .await
        .unwrap();
    assert_eq!(embedder.texts_seen(), total_view_texts(fewer));
}
