//! Benchmarks for score fusion and the end-to-end citation fusion engine.
//!
//! Run with: `cargo bench -p docket-core --bench fusion`
//!
//! Engine benchmarks use the offline `HashingEmbedder`, so query embedding
//! cost is hashing rather than a network call.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docket_core::embedding::{Embedder, HashingEmbedder};
use docket_core::search::fusion::{min_max_normalize, weighted_rrf};
use docket_core::search::{build_engine, EngineKind, IndexSet, ScoredDoc};
use docket_core::storage::InMemoryIndexStore;
use docket_core::{DocId, EngineConfig, Opinion};
use std::collections::HashMap;
use std::sync::Arc;

const DIM: usize = 256;

// =============================================================================
// Test Data Generation
// =============================================================================

fn ranked_list(size: usize, offset: usize) -> Vec<ScoredDoc> {
    (0..size)
        .map(|i| ScoredDoc {
            id: DocId::new(format!("A-{:05}", (i + offset) % (size * 2))),
            score: 1.0 / (i as f32 + 1.0),
        })
        .collect()
}

fn score_map(size: usize) -> HashMap<DocId, f32> {
    (0..size)
        .map(|i| (DocId::new(format!("A-{i:05}")), (i * 7 % 101) as f32))
        .collect()
}

fn opinion(i: usize) -> Opinion {
    const TOPICS: &[(&str, &str)] = &[
        ("87103(a)", "financial interest in a business entity requires disqualification"),
        ("89503", "gifts from a single source are limited each calendar year"),
        ("84200", "committees file semiannual campaign statements"),
        ("86100", "lobbying firms register and file quarterly reports"),
    ];
    let (section, body) = TOPICS[i % TOPICS.len()];
    let text = format!("Opinion {i}. Under Section {section}, {body}. Request number {i}.");

    let mut opinion = Opinion {
        id: format!("A-{i:05}"),
        ..Opinion::default()
    };
    opinion.embedding.qa_text = Some(text.clone());
    opinion.content.full_text = Some(text);
    opinion.citations.government_code = vec![section.to_string()];
    opinion
}

fn build_index(rt: &tokio::runtime::Runtime, size: usize) -> Arc<IndexSet> {
    let opinions: Vec<Opinion> = (0..size).map(opinion).collect();
    let store = InMemoryIndexStore::new();
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
    let index = rt
        .block_on(IndexSet::open_or_build(
            &opinions,
            &store,
            embedder,
            EngineConfig::default(),
            false,
            |_| {},
        ))
        .unwrap();
    Arc::new(index)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_fusion_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion/primitives");

    for size in [100, 1_000] {
        let scores = score_map(size);
        let lexical = ranked_list(size, 0);
        let semantic = ranked_list(size, size / 2);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("min_max", size), &scores, |b, scores| {
            b.iter(|| min_max_normalize(black_box(scores)))
        });
        group.bench_with_input(BenchmarkId::new("weighted_rrf", size), &size, |b, _| {
            b.iter(|| weighted_rrf(black_box(&lexical), black_box(&semantic), 60.0, 0.7, 0.3))
        });
    }
    group.finish();
}

fn bench_engines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let queries = [
        ("citation", "Section 87103(a) disqualification"),
        ("keyword", "gift limits calendar year"),
    ];

    let mut group = c.benchmark_group("fusion/engine");
    group.sample_size(30);

    for size in [1_000, 5_000] {
        let index = build_index(&rt, size);
        for kind in [EngineKind::Bm25, EngineKind::HybridRrf, EngineKind::CitationFusion] {
            let engine = build_engine(kind, index.clone());
            for (label, query) in queries {
                group.bench_with_input(
                    BenchmarkId::new(format!("{kind}/{label}"), size),
                    &query,
                    |b, query| {
                        b.to_async(&rt)
                            .iter(|| async { engine.search(black_box(query), 20).await.unwrap() })
                    },
                );
            }
        }
    }
    group.finish();
}

criterion_group!(benches, bench_fusion_primitives, bench_engines);

criterion_main!(benches);
