//! Embedding pipeline for building the semantic index.
//!
//! The [`EmbeddingPipeline`] embeds one view of the corpus at a time:
//!
//! 1. **Resume**: vectors already in the store are kept, only missing
//!    opinions are embedded
//! 2. **Plan**: texts are grouped into requests within the embedder's batch
//!    and token limits
//! 3. **Embed**: a request the embedder rejects as too large is split in half
//!    and retried
//! 4. **Commit**: each finished request is written to the store before the
//!    next one starts

use super::batch::plan_batches;
use super::progress::{EmbeddingProgress, ProgressTimer};
use crate::corpus::Opinion;
use crate::embedding::{estimate_tokens, prepare_text, Embedder};
use crate::error::{EmbeddingError, SearchError};
use crate::metrics::{elapsed_ms, global_metrics, SearchMetrics};
use crate::search::vector::{view_text, ViewVectors};
use crate::search::{DocId, View};
use crate::storage::IndexStore;
use std::collections::HashSet;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Embeds corpus views into an [`IndexStore`].
///
/// # Example
///
/// ```ignore
/// use docket_core::processing::EmbeddingPipeline;
///
/// let pipeline = EmbeddingPipeline::new(embedder.clone(), 64);
/// let vectors = pipeline
///     .embed_view(&store, &opinions, View::Qa, |p| {
///         println!("{:.0}% ({} tok/s)", p.percent_complete(), p.tokens_per_second());
///     })
///     .await?;
/// ```
pub struct EmbeddingPipeline {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    metrics: SearchMetrics,
}

impl EmbeddingPipeline {
    /// Creates a new pipeline.
    ///
    /// # Arguments
    ///
    /// * `embedder` - The embedder to use for computing embeddings
    /// * `batch_size` - Maximum texts per embedding request
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            metrics: global_metrics().clone(),
        }
    }

    /// Records batch timings into `metrics` instead of the global collector.
    pub fn with_metrics(mut self, metrics: SearchMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns a reference to the embedder.
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embeds every opinion that has text for `view` and returns the full set
    /// of vectors for that view.
    ///
    /// # Arguments
    ///
    /// * `store` - Destination for vectors; also the source of resumed ones
    /// * `opinions` - The corpus
    /// * `view` - Which text of each opinion to embed
    /// * `on_progress` - Called after every committed request
    ///
    /// # Errors
    ///
    /// - [`SearchError::Embedding`] if the embedder fails for a reason other
    ///   than request size, or rejects a single text as too large
    /// - [`SearchError::Store`] if a batch cannot be committed
    /// - [`SearchError::IndexUnavailable`] if a stored vector has the wrong
    ///   dimension
    #[instrument(skip_all, fields(view = %view, opinions = opinions.len()))]
    pub async fn embed_view<S, F>(
        &self,
        store: &S,
        opinions: &[Opinion],
        view: View,
        mut on_progress: F,
    ) -> Result<ViewVectors, SearchError>
    where
        S: IndexStore + ?Sized,
        F: FnMut(EmbeddingProgress),
    {
        let timer = ProgressTimer::new();
        let max_tokens = self.embedder.max_tokens_per_text();

        let wanted: Vec<(DocId, String)> = opinions
            .iter()
            .filter_map(|op| {
                view_text(op, view).map(|text| (DocId::new(&op.id), prepare_text(&text, max_tokens)))
            })
            .collect();
        let wanted_ids: HashSet<&DocId> = wanted.iter().map(|(id, _)| id).collect();

        let stored = store.load_vectors(view).await?;
        let stored_ids: HashSet<&DocId> = stored.iter().map(|(id, _)| id).collect();

        let (pending_ids, pending_texts): (Vec<DocId>, Vec<String>) = wanted
            .iter()
            .filter(|(id, _)| !stored_ids.contains(id))
            .cloned()
            .unzip();

        let total = wanted.len();
        let mut completed = total - pending_ids.len();
        if completed > 0 {
            info!(resumed = completed, pending = pending_ids.len(), "Resuming view from store");
        }
        on_progress(EmbeddingProgress::new(view, completed, total, 0, 0));

        let mut new_rows: Vec<(DocId, Vec<f32>)> = Vec::with_capacity(pending_ids.len());
        let mut tokens_processed = 0;
        let batches = plan_batches(
            &pending_texts,
            self.batch_size,
            self.embedder.max_tokens_per_request(),
        );

        for range in batches {
            let texts = &pending_texts[range.clone()];
            let started = Instant::now();
            let vectors = self.embed_adaptive(texts).await?;
            self.metrics
                .record_embedding_batch(elapsed_ms(started), texts.len());
            let rows: Vec<(DocId, Vec<f32>)> =
                pending_ids[range].iter().cloned().zip(vectors).collect();

            store.put_vectors(view, &rows).await?;

            completed += rows.len();
            tokens_processed += texts.iter().map(|t| estimate_tokens(t)).sum::<usize>();
            debug!(completed, total, "Committed batch");
            on_progress(EmbeddingProgress::new(
                view,
                completed,
                total,
                tokens_processed,
                timer.elapsed_ms(),
            ));
            new_rows.extend(rows);
        }

        let mut vectors = ViewVectors::new(self.embedder.dimension());
        for (id, vector) in stored.into_iter().chain(new_rows) {
            if wanted_ids.contains(&id) {
                vectors.insert(id, vector)?;
            }
        }

        info!(
            vectors = vectors.len(),
            elapsed_ms = timer.elapsed_ms(),
            "View embedded"
        );
        Ok(vectors)
    }

    /// Embeds `texts` in as few requests as the embedder accepts.
    ///
    /// A request rejected as too large is split in half; both halves are
    /// retried in order. Output order matches input order.
    async fn embed_adaptive(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        // Stack of ranges still to embed; the top is always the leftmost.
        let mut todo = vec![0..texts.len()];

        while let Some(range) = todo.pop() {
            match self.embedder.embed_batch(&texts[range.clone()]).await {
                Ok(vectors) if vectors.len() == range.len() => out.extend(vectors),
                Ok(vectors) => {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "expected {} embeddings, got {}",
                        range.len(),
                        vectors.len()
                    )))
                }
                Err(EmbeddingError::RequestTooLarge {
                    estimated_tokens,
                    limit,
                }) if range.len() > 1 => {
                    let mid = range.start + range.len() / 2;
                    warn!(
                        texts = range.len(),
                        estimated_tokens, limit, "Request too large, splitting batch"
                    );
                    todo.push(mid..range.end);
                    todo.push(range.start..mid);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
