//! Error types for docket-core.
//!
//! Errors fall into two groups. Configuration-class errors ([`ConfigError`],
//! [`CorpusError`], [`StoreError`](crate::storage::StoreError) and
//! [`DatasetError`](crate::evaluation::DatasetError)) are fatal and surface
//! immediately. [`EmbeddingError`] is the capability-unavailable class: the
//! query path recovers from it by falling back to lexical ranking.
//!
//! Data-quality problems (empty text fields, duplicate ids in a result list)
//! are not errors at all; they are logged with `tracing::warn!` and
//! normalized.

use crate::storage::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the external embedding capability.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Capability missing, unreachable, or returned a failure status
    #[error("Embedding capability unavailable: {0}")]
    Unavailable(String),
    /// Call did not complete within the configured timeout
    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),
    /// Request exceeded the capability's input limit
    #[error("Embedding request too large: ~{estimated_tokens} tokens exceeds limit of {limit}")]
    RequestTooLarge {
        /// Estimated tokens in the rejected request
        estimated_tokens: usize,
        /// Limit reported or configured for the capability
        limit: usize,
    },
    /// Response could not be interpreted (wrong count, wrong dimension, bad JSON)
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A field failed validation
    #[error("Invalid value for `{field}`: {message}")]
    Invalid {
        /// Dotted field path, e.g. `fusion.cb_threshold`
        field: String,
        /// What is wrong with it
        message: String,
    },
    /// Config file could not be read
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },
    /// Config file is not valid TOML for [`EngineConfig`](crate::config::EngineConfig)
    #[error("Failed to parse config {path}: {message}")]
    Parse { path: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors while reading the opinion corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Corpus root does not exist
    #[error("Corpus path not found: {0}")]
    NotFound(String),
    /// Directory traversal or file read failed
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },
    /// File is not a valid opinion document
    #[error("Malformed opinion {path}: {message}")]
    Malformed { path: String, message: String },
    /// No opinion files were found under the corpus root
    #[error("No opinions found under {0}")]
    Empty(String),
}

/// Top-level error for building indexes and running engines.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Engine requires an index component that was not built
    #[error("Index component unavailable: {0}")]
    IndexUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message_names_field() {
        let err = ConfigError::invalid("fusion.cb_threshold", "must be >= 1.0");
        assert_eq!(
            err.to_string(),
            "Invalid value for `fusion.cb_threshold`: must be >= 1.0"
        );
    }

    #[test]
    fn test_search_error_is_transparent() {
        let err: SearchError = EmbeddingError::Timeout(Duration::from_millis(250)).into();
        assert_eq!(err.to_string(), "Embedding request timed out after 250ms");
    }
}
