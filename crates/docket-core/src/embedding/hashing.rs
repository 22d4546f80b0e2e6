//! Offline embedder based on signed feature hashing.
//!
//! Each lexical term (and each adjacent term pair) is hashed into one of
//! `dimension` buckets with a hash-derived sign. Texts that share vocabulary
//! end up with high cosine similarity. It has none of a trained model's
//! semantics but is deterministic, fast and needs no network, which makes
//! it the default for tests and benches.

use super::traits::Embedder;
use crate::error::EmbeddingError;
use crate::hash::fnv1a;
use crate::search::tokenize::tokenize;
use async_trait::async_trait;

/// Deterministic feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embeds one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);

        let mut add = |hash: u64, weight: f32| {
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign * weight;
        };

        for token in &tokens {
            add(fnv1a(&[token.as_str()]), 1.0);
        }
        for pair in tokens.windows(2) {
            add(fnv1a(&[pair[0].as_str(), pair[1].as_str()]), 0.5);
        }

        super::l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
