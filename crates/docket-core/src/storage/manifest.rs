//! Index manifest: what a stored index was built from.

use crate::config::EngineConfig;
use crate::corpus::TextField;
use crate::search::View;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Describes a stored index so a later run can decide whether to reuse it.
///
/// Two manifests describe the same index when [`IndexManifest::mismatch`]
/// returns `None`; timestamps and the schema version are ignored by that
/// comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Current schema version of this index
    pub schema_version: u32,
    /// Minimum schema version required to read this index
    pub min_compatible_version: u32,
    /// When the index was first built
    pub created_at: DateTime<Utc>,
    /// Number of opinions indexed
    pub document_count: usize,
    /// Digest of the opinion ids, in corpus order
    pub corpus_digest: u64,
    /// Field the lexical index was built over
    pub text_field: TextField,
    pub k1: f32,
    pub b: f32,
    /// Views that were embedded
    pub views: Vec<View>,
    pub embedding_dimension: usize,
    /// Embedder that produced the vectors
    pub embedder: String,
}

impl IndexManifest {
    /// Manifest for an index about to be built from `config`.
    pub fn new(
        config: &EngineConfig,
        document_count: usize,
        corpus_digest: u64,
        embedder: &str,
        embedding_dimension: usize,
    ) -> Self {
        let mut views = config.semantic.views.clone();
        views.sort();
        views.dedup();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            min_compatible_version: 1,
            created_at: Utc::now(),
            document_count,
            corpus_digest,
            text_field: config.lexical.field,
            k1: config.lexical.k1,
            b: config.lexical.b,
            views,
            embedding_dimension,
            embedder: embedder.to_string(),
        }
    }

    /// Checks if this index can be read by the current version.
    pub fn is_compatible(&self) -> bool {
        CURRENT_SCHEMA_VERSION >= self.min_compatible_version
    }

    /// First build input that differs from `expected`, or `None` if the
    /// stored index can be reused as is.
    pub fn mismatch(&self, expected: &IndexManifest) -> Option<String> {
        if !self.is_compatible() {
            return Some(format!(
                "index requires schema >= {}, this build reads {}",
                self.min_compatible_version, CURRENT_SCHEMA_VERSION
            ));
        }
        if self.document_count != expected.document_count {
            return Some(format!(
                "document count {} != {}",
                self.document_count, expected.document_count
            ));
        }
        if self.corpus_digest != expected.corpus_digest {
            return Some("corpus content changed".to_string());
        }
        if self.text_field != expected.text_field {
            return Some(format!(
                "text field {} != {}",
                self.text_field, expected.text_field
            ));
        }
        if self.k1 != expected.k1 || self.b != expected.b {
            return Some(format!(
                "BM25 parameters ({}, {}) != ({}, {})",
                self.k1, self.b, expected.k1, expected.b
            ));
        }
        if self.views != expected.views {
            return Some(format!("views {:?} != {:?}", self.views, expected.views));
        }
        if self.embedding_dimension != expected.embedding_dimension
            || self.embedder != expected.embedder
        {
            return Some(format!(
                "embedder {}/{} != {}/{}",
                self.embedder,
                self.embedding_dimension,
                expected.embedder,
                expected.embedding_dimension
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> IndexManifest {
        IndexManifest::new(&EngineConfig::default(), 10, 42, "hashing", 256)
    }

    #[test]
    fn test_identical_inputs_match() {
        let a = manifest();
        let b = manifest();
        assert!(a.mismatch(&b).is_none());
    }

    #[test]
    fn test_changed_inputs_are_reported() {
        let stored = manifest();

        let mut expected = manifest();
        expected.document_count = 11;
        assert!(stored.mismatch(&expected).unwrap().contains("document count"));

        let mut expected = manifest();
        expected.text_field = TextField::QaText;
        assert!(stored.mismatch(&expected).unwrap().contains("text field"));

        let mut expected = manifest();
        expected.embedding_dimension = 1536;
        assert!(stored.mismatch(&expected).unwrap().contains("embedder"));
    }

    #[test]
    fn test_future_schema_is_incompatible() {
        let mut stored = manifest();
        stored.min_compatible_version = CURRENT_SCHEMA_VERSION + 1;
        assert!(!stored.is_compatible());
        assert!(stored.mismatch(&manifest()).is_some());
    }

    #[test]
    fn test_json_roundtrip_keeps_timestamp() {
        let stored = manifest();
        let json = serde_json::to_string(&stored).unwrap();
        let loaded: IndexManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, stored);
    }
}
