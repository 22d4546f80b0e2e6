//! OpenAI-compatible HTTP embedding provider.
//!
//! Sends `POST {base_url}/embeddings` with `{"model", "input"}` and a bearer
//! token. Request-size rejections are reported as
//! [`EmbeddingError::RequestTooLarge`] so the batch planner can split the
//! batch; every other failure is [`EmbeddingError::Unavailable`].

use super::traits::Embedder;
use crate::config::{EmbeddingConfig, API_KEY_ENV};
use crate::error::EmbeddingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    dimension: usize,
    max_tokens_per_text: usize,
    max_tokens_per_request: usize,
}

impl HttpEmbedder {
    /// Creates a client from config, reading the key from `DOCKET_EMBEDDING_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Unavailable`] if the key is not set or the
    /// HTTP client cannot be built.
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| EmbeddingError::Unavailable(format!("{API_KEY_ENV} is not set")))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| EmbeddingError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            dimension: config.dimension(),
            max_tokens_per_text: config.max_tokens_per_text,
            max_tokens_per_request: config.max_tokens_per_request,
        })
    }
}

/// Whether an error body describes an oversized request.
fn is_too_large(status: reqwest::StatusCode, body: &str) -> bool {
    if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
        return true;
    }
    let body = body.to_lowercase();
    status == reqwest::StatusCode::BAD_REQUEST
        && (body.contains("maximum context length")
            || body.contains("too many tokens")
            || body.contains("max_tokens_per_request"))
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens_per_text(&self) -> usize {
        self.max_tokens_per_text
    }

    fn max_tokens_per_request(&self) -> usize {
        self.max_tokens_per_request
    }

    #[instrument(skip_all, fields(texts = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("HTTP error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_too_large(status, &body) {
                let estimated_tokens = texts.iter().map(|t| super::estimate_tokens(t)).sum();
                return Err(EmbeddingError::RequestTooLarge {
                    estimated_tokens,
                    limit: self.max_tokens_per_request,
                });
            }
            return Err(EmbeddingError::Unavailable(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(format!("JSON parse error: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected dimension {}, got {}",
                self.dimension,
                bad.len()
            )));
        }

        debug!(count = vectors.len(), "Received embeddings");
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = EmbeddingConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = HttpEmbedder::new(&config, "key".to_string()).unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:8080/v1/embeddings");
        assert_eq!(embedder.name(), "text-embedding-3-small");
    }

    #[test]
    fn test_too_large_detection() {
        assert!(is_too_large(reqwest::StatusCode::PAYLOAD_TOO_LARGE, ""));
        assert!(is_too_large(
            reqwest::StatusCode::BAD_REQUEST,
            "This model's maximum context length is 8192 tokens"
        ));
        assert!(!is_too_large(reqwest::StatusCode::BAD_REQUEST, "invalid model"));
        assert!(!is_too_large(reqwest::StatusCode::UNAUTHORIZED, "too many tokens"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let config = EmbeddingConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 500,
            ..EmbeddingConfig::default()
        };
        let embedder = HttpEmbedder::new(&config, "key".to_string()).unwrap();
        let err = embedder.embed_query("gift").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)));
    }
}
