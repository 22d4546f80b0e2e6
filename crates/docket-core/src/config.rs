//! Retrieval configuration.
//!
//! Constants define the production defaults. [`EngineConfig`] groups every
//! tunable an engine reads, so experiments are reproducible from one TOML
//! file.
//!
//! # Resolution order
//!
//! Highest priority first:
//! 1. CLI flags (applied by the binaries)
//! 2. Environment variables (`DOCKET_*`)
//! 3. Config file (`--config`, else `docket.toml` in the working directory)
//! 4. Compiled defaults
//!
//! # Usage
//!
//! ```
//! use docket_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml(r#"
//!     [fusion]
//!     cb_threshold = 1.2
//! "#).unwrap();
//! assert_eq!(config.fusion.cb_threshold, 1.2);
//! assert_eq!(config.fusion.lexical_weight, 0.4);
//! ```

use crate::corpus::TextField;
use crate::error::ConfigError;
use crate::search::types::View;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Retrieval defaults
// =============================================================================

/// Results requested per query by the scorer.
pub const DEFAULT_TOP_K: usize = 20;

/// BM25 term-frequency saturation.
pub const DEFAULT_K1: f32 = 1.5;

/// BM25 length-normalization strength.
pub const DEFAULT_B: f32 = 0.75;

/// Floor for negative IDF values, as a fraction of the mean IDF.
pub const BM25_IDF_EPSILON: f32 = 0.25;

/// Lexical candidates unioned into every candidate pool.
pub const LEXICAL_POOL_SIZE: usize = 100;

/// Standard RRF constant.
pub const RRF_K: f32 = 60.0;

/// Default circuit-breaker threshold on the lexical top1/top2 ratio.
///
/// Values between 1.2 and 1.3 capture almost the same queries.
pub const DEFAULT_CB_THRESHOLD: f32 = 1.3;

// =============================================================================
// Embedding defaults
// =============================================================================

/// Approximate characters per token for English text.
pub const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

/// Per-text input limit of the default embedding model.
pub const MAX_TOKENS_PER_TEXT: usize = 8191;

/// Per-request input limit of the default embedding model.
pub const MAX_TOKENS_PER_REQUEST: usize = 300_000;

/// Dimension of `text-embedding-3-small`.
pub const HTTP_EMBEDDING_DIM: usize = 1536;

/// Dimension of the offline hashing embedder.
pub const HASHING_EMBEDDING_DIM: usize = 256;

/// Environment variable holding the embedding API key.
pub const API_KEY_ENV: &str = "DOCKET_EMBEDDING_API_KEY";

// =============================================================================
// Config structures
// =============================================================================

/// Every tunable an engine reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub lexical: LexicalConfig,
    pub semantic: SemanticConfig,
    pub fusion: FusionConfig,
    pub rrf: RrfConfig,
    pub embedding: EmbeddingConfig,
}

/// BM25 parameters and the field it indexes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub k1: f32,
    pub b: f32,
    pub field: TextField,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            field: TextField::FullText,
        }
    }
}

/// Semantic views to embed and how to combine them at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub views: Vec<View>,
    pub policy: ViewPolicy,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            views: vec![View::Qa, View::Facts, View::Analysis],
            policy: ViewPolicy::default(),
        }
    }
}

/// How per-view similarities combine into one semantic score.
///
/// Taking the plain maximum lets any secondary view with a high generic
/// similarity promote an irrelevant opinion. `Weighted` keeps the primary
/// view in charge and lets secondary views add a bounded bonus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewPolicy {
    /// Only the primary (`qa`) view.
    PrimaryOnly,
    /// Per-document maximum over all views; missing views count as 0.
    Max,
    /// `primary + min(max_bonus, secondary_weight * max(0, best_secondary - primary))`
    Weighted {
        secondary_weight: f32,
        max_bonus: f32,
    },
}

impl Default for ViewPolicy {
    fn default() -> Self {
        ViewPolicy::Weighted {
            secondary_weight: 0.5,
            max_bonus: 0.05,
        }
    }
}

/// Tunables for min-max score fusion and the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    pub cb_threshold: f32,
    pub lexical_pool_size: usize,
    /// Pools larger than this are logged as a precision risk (never truncated).
    pub large_pool_warning: usize,
    pub embed_timeout_ms: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            cb_threshold: DEFAULT_CB_THRESHOLD,
            lexical_pool_size: LEXICAL_POOL_SIZE,
            large_pool_warning: 1000,
            embed_timeout_ms: 10_000,
        }
    }
}

impl FusionConfig {
    /// Equal-weight blend used for unpooled, non-citation fusion.
    pub fn non_citation_blend() -> Self {
        Self {
            lexical_weight: 0.5,
            semantic_weight: 0.5,
            ..Self::default()
        }
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }
}

/// Weighted reciprocal rank fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RrfConfig {
    pub k: f32,
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    pub pool_size: usize,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self {
            k: RRF_K,
            lexical_weight: 0.7,
            semantic_weight: 0.3,
            pool_size: LEXICAL_POOL_SIZE,
        }
    }
}

/// Which embedding capability to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Offline feature-hashing embedder
    #[default]
    Hashing,
    /// OpenAI-compatible HTTP endpoint
    Http,
}

/// Embedding capability and batch planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    /// Vector length; defaults per provider when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    /// Upper bound on texts per request; shrinks further under the token budget.
    pub batch_size: usize,
    pub max_tokens_per_text: usize,
    pub max_tokens_per_request: usize,
    pub request_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: None,
            batch_size: 64,
            max_tokens_per_text: MAX_TOKENS_PER_TEXT,
            max_tokens_per_request: MAX_TOKENS_PER_REQUEST,
            request_timeout_ms: 60_000,
        }
    }
}

impl EmbeddingConfig {
    /// Configured dimension, or the provider's default.
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(match self.provider {
            EmbeddingProvider::Hashing => HASHING_EMBEDDING_DIM,
            EmbeddingProvider::Http => HTTP_EMBEDDING_DIM,
        })
    }
}

impl EngineConfig {
    /// Loads configuration from an optional file plus `DOCKET_*` variables.
    ///
    /// With `path = None`, `docket.toml` in the working directory is used if
    /// present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file is missing, any file fails
    /// to parse, or the merged result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = Path::new("docket.toml");
                if local.exists() {
                    Self::from_file(local)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file; unknown keys are ignored.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Parses a TOML string (used by tests and embedded configs).
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Applies `DOCKET_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DOCKET_CB_THRESHOLD") {
            self.fusion.cb_threshold = parse_env("DOCKET_CB_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("DOCKET_LEXICAL_WEIGHT") {
            self.fusion.lexical_weight = parse_env("DOCKET_LEXICAL_WEIGHT", &v)?;
        }
        if let Some(v) = lookup("DOCKET_SEMANTIC_WEIGHT") {
            self.fusion.semantic_weight = parse_env("DOCKET_SEMANTIC_WEIGHT", &v)?;
        }
        if let Some(v) = lookup("DOCKET_EMBED_TIMEOUT_MS") {
            self.fusion.embed_timeout_ms = parse_env("DOCKET_EMBED_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("DOCKET_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Some(v) = lookup("DOCKET_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("DOCKET_EMBEDDING_PROVIDER") {
            self.embedding.provider = match v.trim() {
                "hashing" => EmbeddingProvider::Hashing,
                "http" => EmbeddingProvider::Http,
                other => {
                    return Err(ConfigError::invalid(
                        "DOCKET_EMBEDDING_PROVIDER",
                        format!("unknown provider {other:?} (expected `hashing` or `http`)"),
                    ))
                }
            };
        }
        Ok(())
    }

    /// Checks every numeric tunable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate()?;

        if !(self.lexical.k1 >= 0.0) {
            return Err(ConfigError::invalid("lexical.k1", "must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.lexical.b) {
            return Err(ConfigError::invalid("lexical.b", "must be between 0 and 1"));
        }
        if !self.semantic.views.contains(&View::Qa) {
            return Err(ConfigError::invalid(
                "semantic.views",
                "must include the primary `qa` view",
            ));
        }
        if let ViewPolicy::Weighted {
            secondary_weight,
            max_bonus,
        } = self.semantic.policy
        {
            if secondary_weight < 0.0 || max_bonus < 0.0 {
                return Err(ConfigError::invalid(
                    "semantic.policy",
                    "weights must be non-negative",
                ));
            }
        }
        if self.rrf.k <= 0.0 || self.rrf.pool_size == 0 {
            return Err(ConfigError::invalid("rrf", "k and pool_size must be positive"));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::invalid("embedding.batch_size", "must be > 0"));
        }
        if self.embedding.dimension() == 0 {
            return Err(ConfigError::invalid("embedding.dimension", "must be > 0"));
        }
        if self.embedding.max_tokens_per_text == 0
            || self.embedding.max_tokens_per_request < self.embedding.max_tokens_per_text
        {
            return Err(ConfigError::invalid(
                "embedding.max_tokens_per_request",
                "must be at least max_tokens_per_text (and both > 0)",
            ));
        }
        Ok(())
    }
}

impl FusionConfig {
    /// Checks weights, threshold, pool size and timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lexical_weight < 0.0 || self.semantic_weight < 0.0 {
            return Err(ConfigError::invalid(
                "fusion.weights",
                "weights must be non-negative",
            ));
        }
        if self.lexical_weight + self.semantic_weight <= 0.0 {
            return Err(ConfigError::invalid(
                "fusion.weights",
                "at least one weight must be positive",
            ));
        }
        if !(self.cb_threshold >= 1.0) {
            return Err(ConfigError::invalid("fusion.cb_threshold", "must be >= 1.0"));
        }
        if self.lexical_pool_size == 0 {
            return Err(ConfigError::invalid("fusion.lexical_pool_size", "must be > 0"));
        }
        if self.embed_timeout_ms == 0 {
            return Err(ConfigError::invalid("fusion.embed_timeout_ms", "must be > 0"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("cannot parse {value:?}")))
}
