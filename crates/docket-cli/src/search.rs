//! Index loading and query execution.

use anyhow::{Context, Result};
use docket_core::embedding::build_embedder;
use docket_core::processing::EmbeddingProgress;
use docket_core::search::{build_engine, EngineKind, IndexSet};
use docket_core::{EngineConfig, SearchOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Where the corpus and index live, and whether to start over.
pub struct IndexLocation<'a> {
    pub corpus: &'a Path,
    pub index_dir: &'a Path,
    pub rebuild: bool,
}

/// Opens the stored index, building (or resuming) it when stale.
///
/// Embedding progress is drawn as one bar per view on stderr.
pub async fn open_index(location: IndexLocation<'_>, config: EngineConfig) -> Result<Arc<IndexSet>> {
    let embedder = build_embedder(&config.embedding).context("Failed to create embedder")?;

    std::fs::create_dir_all(location.index_dir).with_context(|| {
        format!("Failed to create index directory: {}", location.index_dir.display())
    })?;

    let pb = ProgressBar::hidden();
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:>10} [{bar:40}] {pos}/{len} ({elapsed})")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );
    let mut current_view = None;
    let on_progress = |progress: EmbeddingProgress| {
        if current_view != Some(progress.view) {
            current_view = Some(progress.view);
            if pb.is_hidden() {
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            }
            pb.reset();
            pb.set_length(progress.texts_total as u64);
            pb.set_message(progress.view.as_str());
        }
        pb.set_position(progress.texts_completed as u64);
    };

    let index = IndexSet::initialize(
        location.corpus,
        location.index_dir,
        embedder,
        config,
        location.rebuild,
        on_progress,
    )
    .await
    .with_context(|| {
        format!(
            "Failed to open index for corpus {} in {}",
            location.corpus.display(),
            location.index_dir.display()
        )
    })?;
    pb.finish_and_clear();

    info!(documents = index.len(), "Index ready");
    Ok(Arc::new(index))
}

/// Runs one query and returns the explained outcome.
pub async fn execute_search(
    index: Arc<IndexSet>,
    kind: EngineKind,
    query: &str,
    top_k: usize,
) -> Result<SearchOutcome> {
    let engine = build_engine(kind, index);
    info!(engine = engine.name(), "Searching for: \"{}\"", query);
    engine
        .explain(query, top_k)
        .await
        .with_context(|| format!("Search failed for \"{}\"", query))
}
