//! The embedding capability.
//!
//! An [`Embedder`] turns text into dense vectors. The index build embeds the
//! corpus in batches through [`Embedder::embed_batch`]; the query path embeds
//! a single query through [`Embedder::embed_query`]. Implementations can be
//! remote (HTTP) or local, so both calls are async and fallible.

use crate::config::{MAX_TOKENS_PER_REQUEST, MAX_TOKENS_PER_TEXT};
use crate::error::EmbeddingError;
use async_trait::async_trait;

/// Trait for embedding providers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one embedder is shared by every
/// concurrently evaluated query.
///
/// # Examples
///
/// ```ignore
/// let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
///
/// let vectors = embedder.embed_batch(&["gift limits".to_string()]).await?;
/// assert_eq!(vectors[0].len(), embedder.dimension());
/// ```
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short identifier recorded in the index manifest (model name).
    fn name(&self) -> &str;

    /// Length of every returned vector.
    fn dimension(&self) -> usize;

    /// Largest input accepted for a single text, in tokens.
    fn max_tokens_per_text(&self) -> usize {
        MAX_TOKENS_PER_TEXT
    }

    /// Largest total input accepted in one request, in tokens.
    fn max_tokens_per_request(&self) -> usize {
        MAX_TOKENS_PER_REQUEST
    }

    /// Embeds a batch of texts, returning one vector per text in order.
    ///
    /// # Errors
    ///
    /// - [`EmbeddingError::RequestTooLarge`] if the batch exceeds the
    ///   provider's input limit; callers retry with a smaller batch
    /// - [`EmbeddingError::Unavailable`] for transport or provider failures
    /// - [`EmbeddingError::InvalidResponse`] for malformed responses
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embeds a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty response for query".into()))
    }
}
