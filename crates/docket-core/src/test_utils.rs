//! Test utilities for docket-core.
//!
//! Opinion builders and scripted embedders shared by unit tests. Only
//! compiled when running tests.

use crate::corpus::Opinion;
use crate::embedding::{Embedder, HashingEmbedder};
use crate::error::EmbeddingError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Builder for synthetic opinions.
#[derive(Default)]
pub struct OpinionBuilder {
    opinion: Opinion,
}

impl OpinionBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            opinion: Opinion {
                id: id.to_string(),
                ..Default::default()
            },
        }
    }

    /// Sets both the QA text and the full text.
    pub fn text(mut self, text: &str) -> Self {
        self.opinion.embedding.qa_text = Some(text.to_string());
        self.opinion.content.full_text = Some(text.to_string());
        self
    }

    pub fn facts(mut self, facts: &str) -> Self {
        self.opinion.sections.facts = Some(facts.to_string());
        self
    }

    pub fn analysis(mut self, analysis: &str) -> Self {
        self.opinion.sections.analysis = Some(analysis.to_string());
        self
    }

    pub fn statutes(mut self, statutes: &[&str]) -> Self {
        self.opinion.citations.government_code = statutes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn regulations(mut self, regulations: &[&str]) -> Self {
        self.opinion.citations.regulations = regulations.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn topic(mut self, topic: &str) -> Self {
        self.opinion.classification.topic_primary = Some(topic.to_string());
        self
    }

    pub fn build(self) -> Opinion {
        self.opinion
    }
}

/// Shorthand for an opinion with text and (possibly empty) facts.
pub fn opinion(id: &str, text: &str, facts: &str) -> Opinion {
    let builder = OpinionBuilder::new(id).text(text);
    if facts.is_empty() {
        builder.build()
    } else {
        builder.facts(facts).build()
    }
}

/// Embedder with scripted failures, built on [`HashingEmbedder`].
///
/// Counts calls and successfully embedded texts so tests can assert on how
/// the embedder was used.
pub struct ScriptedEmbedder {
    inner: HashingEmbedder,
    request_limit: Option<usize>,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension),
            request_limit: None,
            fail_after: None,
            delay: None,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        }
    }

    /// Rejects requests with more than `texts` texts as too large.
    pub fn with_request_limit(mut self, texts: usize) -> Self {
        self.request_limit = Some(texts);
        self
    }

    /// Succeeds for the first `calls` calls, then reports unavailable.
    pub fn fail_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Sleeps before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts_seen(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn name(&self) -> &str {
        "scripted"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(EmbeddingError::Unavailable("scripted failure".into()));
        }
        if let Some(limit) = self.request_limit {
            if texts.len() > limit {
                return Err(EmbeddingError::RequestTooLarge {
                    estimated_tokens: texts.len(),
                    limit,
                });
            }
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}
