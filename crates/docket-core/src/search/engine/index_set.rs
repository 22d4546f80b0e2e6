//! The shared, immutable set of indexes every engine is composed from.
//!
//! Building is the only expensive step: BM25 and citation indexing are
//! linear in the corpus, embedding is one provider call per batch. The
//! result is persisted so later runs only load it.
//!
//! # Build-or-load
//!
//! [`IndexSet::open_or_build`] makes one decision per run:
//!
//! 1. A stored manifest matching the current corpus and configuration means
//!    the stored index is loaded as is
//! 2. A stored manifest that differs means the store is cleared and rebuilt
//! 3. No manifest means a fresh build, resuming from any vectors an
//!    interrupted build of the same inputs already committed
//!
//! The manifest is written last, so it only ever describes a complete index.

use crate::config::EngineConfig;
use crate::corpus::{corpus_digest, Opinion};
use crate::embedding::Embedder;
use crate::error::{EmbeddingError, SearchError};
use crate::processing::{EmbeddingPipeline, EmbeddingProgress};
use crate::search::citation::CitationIndex;
use crate::search::keyword::LexicalIndex;
use crate::search::types::View;
use crate::search::vector::{SemanticIndex, ViewVectors};
use crate::storage::{
    get_json, put_json, IndexManifest, IndexStore, CITATION_BLOB, LEXICAL_BLOB, MANIFEST_BLOB,
    PENDING_MANIFEST_BLOB,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Lexical, citation and semantic indexes over one corpus, plus the
/// embedder used for queries.
pub struct IndexSet {
    config: EngineConfig,
    lexical: LexicalIndex,
    citations: CitationIndex,
    semantic: SemanticIndex,
    embedder: Arc<dyn Embedder>,
    manifest: IndexManifest,
}

impl IndexSet {
    /// Assembles an index set from already-built parts.
    pub fn from_parts(
        config: EngineConfig,
        lexical: LexicalIndex,
        citations: CitationIndex,
        semantic: SemanticIndex,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let manifest = IndexManifest::new(
            &config,
            lexical.len(),
            0,
            embedder.name(),
            embedder.dimension(),
        );
        Self {
            config,
            lexical,
            citations,
            semantic,
            embedder,
            manifest,
        }
    }

    /// Loads the stored index if it matches `opinions` and `config`, and
    /// builds (or finishes building) it otherwise.
    ///
    /// # Arguments
    ///
    /// * `opinions` - The corpus, in load order
    /// * `store` - Where the index is persisted
    /// * `embedder` - Used for corpus vectors during a build and for queries
    /// * `config` - Engine configuration; lexical and view settings are part
    ///   of the manifest
    /// * `rebuild` - Clear the store first, ignoring anything stored
    /// * `on_progress` - Embedding progress callback, called per batch
    ///
    /// # Errors
    ///
    /// - [`SearchError::Store`] if the store cannot be read or written
    /// - [`SearchError::Embedding`] if corpus embedding fails
    /// - [`SearchError::IndexUnavailable`] if a matching manifest exists but
    ///   an index blob is missing
    #[instrument(skip_all, fields(opinions = opinions.len(), rebuild))]
    pub async fn open_or_build<S, F>(
        opinions: &[Opinion],
        store: &S,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
        rebuild: bool,
        mut on_progress: F,
    ) -> Result<Self, SearchError>
    where
        S: IndexStore + ?Sized,
        F: FnMut(EmbeddingProgress),
    {
        let expected = IndexManifest::new(
            &config,
            opinions.len(),
            corpus_digest(opinions),
            embedder.name(),
            embedder.dimension(),
        );

        if rebuild {
            info!("Clearing stored index");
            store.clear().await?;
        }

        match get_json::<S, IndexManifest>(store, MANIFEST_BLOB).await? {
            Some(stored) => match stored.mismatch(&expected) {
                None => return Self::load(store, stored, embedder, config).await,
                Some(reason) => {
                    warn!(%reason, "Stored index is stale, rebuilding");
                    store.clear().await?;
                }
            },
            None => {
                if let Some(pending) =
                    get_json::<S, IndexManifest>(store, PENDING_MANIFEST_BLOB).await?
                {
                    match pending.mismatch(&expected) {
                        None => info!("Resuming interrupted build"),
                        Some(reason) => {
                            warn!(%reason, "Discarding interrupted build of different inputs");
                            store.clear().await?;
                        }
                    }
                }
            }
        }

        put_json(store, PENDING_MANIFEST_BLOB, &expected).await?;

        let lexical = LexicalIndex::build(opinions, &config.lexical);
        put_json(store, LEXICAL_BLOB, &lexical).await?;

        let citations = CitationIndex::build(opinions);
        put_json(store, CITATION_BLOB, &citations).await?;

        let pipeline = EmbeddingPipeline::new(embedder.clone(), config.embedding.batch_size);
        let mut semantic = SemanticIndex::new(embedder.dimension(), config.semantic.policy);
        for &view in &expected.views {
            let vectors = pipeline
                .embed_view(store, opinions, view, &mut on_progress)
                .await?;
            semantic.insert_view(view, vectors);
        }

        put_json(store, MANIFEST_BLOB, &expected).await?;
        info!(
            documents = lexical.len(),
            primary_vectors = semantic.len(),
            "Built index"
        );

        Ok(Self {
            config,
            lexical,
            citations,
            semantic,
            embedder,
            manifest: expected,
        })
    }

    /// Loads the corpus from `corpus_path` and opens or builds the index in
    /// `{index_dir}/index.redb`.
    #[cfg(feature = "redb-store")]
    pub async fn initialize<F>(
        corpus_path: &std::path::Path,
        index_dir: &std::path::Path,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
        rebuild: bool,
        on_progress: F,
    ) -> Result<Self, SearchError>
    where
        F: FnMut(EmbeddingProgress),
    {
        let opinions = crate::corpus::load_corpus(corpus_path)?;
        let store = crate::storage::RedbIndexStore::open_dir(index_dir)?;
        Self::open_or_build(&opinions, &store, embedder, config, rebuild, on_progress).await
    }

    async fn load<S>(
        store: &S,
        manifest: IndexManifest,
        embedder: Arc<dyn Embedder>,
        config: EngineConfig,
    ) -> Result<Self, SearchError>
    where
        S: IndexStore + ?Sized,
    {
        let lexical: LexicalIndex = get_json(store, LEXICAL_BLOB)
            .await?
            .ok_or_else(|| SearchError::IndexUnavailable("lexical index blob missing".into()))?;
        let citations: CitationIndex = get_json(store, CITATION_BLOB)
            .await?
            .ok_or_else(|| SearchError::IndexUnavailable("citation index blob missing".into()))?;

        let dimension = manifest.embedding_dimension;
        let mut semantic = SemanticIndex::new(dimension, config.semantic.policy);
        for &view in &manifest.views {
            let mut vectors = ViewVectors::new(dimension);
            for (id, vector) in store.load_vectors(view).await? {
                vectors.insert(id, vector)?;
            }
            semantic.insert_view(view, vectors);
        }

        info!(
            documents = lexical.len(),
            primary_vectors = semantic.len(),
            built = %manifest.created_at,
            "Loaded stored index"
        );

        Ok(Self {
            config,
            lexical,
            citations,
            semantic,
            embedder,
            manifest,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn citations(&self) -> &CitationIndex {
        &self.citations
    }

    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Views with vectors in this index set.
    pub fn views(&self) -> &[View] {
        &self.manifest.views
    }

    /// Number of indexed opinions.
    pub fn len(&self) -> usize {
        self.lexical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexical.is_empty()
    }

    /// Embeds a query, giving up after `timeout`.
    ///
    /// A vector whose width differs from the stored vectors is rejected as
    /// [`EmbeddingError::InvalidResponse`].
    pub async fn embed_query(
        &self,
        query: &str,
        timeout: Duration,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let vector = match tokio::time::timeout(timeout, self.embedder.embed_query(query)).await {
            Ok(result) => result?,
            Err(_) => return Err(EmbeddingError::Timeout(timeout)),
        };
        let expected = self.semantic.dimension();
        if vector.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "query vector has dimension {}, index has {expected}",
                vector.len()
            )));
        }
        Ok(vector)
    }
}
