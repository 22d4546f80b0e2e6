//! Embedding capability and text preparation helpers.
//!
//! ## Core Trait
//!
//! - [`Embedder`] - async batch and query embedding
//!
//! ## Implementations
//!
//! - [`HashingEmbedder`] - deterministic offline feature hashing, used for
//!   tests, benches and runs without network access
//! - `HttpEmbedder` - OpenAI-compatible `/embeddings` endpoint (feature
//!   `http-embedder`)
//!
//! ## Example
//!
//! ```ignore
//! use docket_core::embedding::{build_embedder, Embedder};
//!
//! let embedder = build_embedder(&config.embedding)?;
//! let query_vec = embedder.embed_query("behested payments").await?;
//! ```

mod hashing;
#[cfg(feature = "http-embedder")]
mod http;
mod traits;

pub use hashing::HashingEmbedder;
#[cfg(feature = "http-embedder")]
pub use http::HttpEmbedder;
pub use traits::Embedder;

use crate::config::{EmbeddingConfig, EmbeddingProvider, CHARS_PER_TOKEN_ESTIMATE};
use crate::error::EmbeddingError;
use std::sync::Arc;

/// Scales `v` to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Rough token count for English text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN_ESTIMATE)
}

/// Prepares one text for embedding.
///
/// Texts longer than `max_tokens` (estimated) are cut at a character
/// boundary. Blank texts become a single space, since providers reject empty
/// input.
pub fn prepare_text(text: &str, max_tokens: usize) -> String {
    if text.trim().is_empty() {
        return " ".to_string();
    }
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN_ESTIMATE);
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Creates the embedder selected by `config.provider`.
///
/// # Errors
///
/// Returns [`EmbeddingError::Unavailable`] if the HTTP provider is selected
/// but not compiled in or has no API key.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension()))),
        #[cfg(feature = "http-embedder")]
        EmbeddingProvider::Http => Ok(Arc::new(HttpEmbedder::from_env(config)?)),
        #[cfg(not(feature = "http-embedder"))]
        EmbeddingProvider::Http => Err(EmbeddingError::Unavailable(
            "HTTP embedder not compiled in (enable feature `http-embedder`)".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_prepare_text_blank_becomes_space() {
        assert_eq!(prepare_text("", 10), " ");
        assert_eq!(prepare_text("  \n", 10), " ");
    }

    #[test]
    fn test_prepare_text_truncates_on_char_boundary() {
        let text = "é".repeat(50);
        let prepared = prepare_text(&text, 2);
        assert_eq!(prepared.chars().count(), 8);
        assert_eq!(prepare_text("short", 10), "short");
    }

    #[test]
    fn test_build_hashing_embedder() {
        let config = EmbeddingConfig {
            dimension: Some(32),
            ..EmbeddingConfig::default()
        };
        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);
    }
}
