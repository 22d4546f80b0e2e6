//! Persistence for built indexes.
//!
//! An [`IndexStore`] holds two kinds of data:
//!
//! - **Blobs**: named JSON documents (the lexical index, the citation index
//!   and the [`IndexManifest`])
//! - **Vectors**: one embedding per (view, opinion), written in batches as
//!   the corpus is embedded so an interrupted build can resume
//!
//! # Implementations
//!
//! - [`InMemoryIndexStore`] - process-local, used by tests and benches
//! - `RedbIndexStore` - embedded redb database at `{index_dir}/index.redb`
//!   (feature `redb-store`)
//!
//! # Usage
//!
//! ```ignore
//! use docket_core::storage::{get_json, put_json, InMemoryIndexStore, LEXICAL_BLOB};
//!
//! let store = InMemoryIndexStore::new();
//! put_json(&store, LEXICAL_BLOB, &lexical).await?;
//! let restored: Option<LexicalIndex> = get_json(&store, LEXICAL_BLOB).await?;
//! ```

mod manifest;
mod memory;

#[cfg(feature = "redb-store")]
mod redb_store;

pub use manifest::{IndexManifest, CURRENT_SCHEMA_VERSION};
pub use memory::InMemoryIndexStore;

#[cfg(feature = "redb-store")]
pub use redb_store::RedbIndexStore;

use crate::search::{DocId, View};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Blob name of the serialized lexical index.
pub const LEXICAL_BLOB: &str = "lexical";
/// Blob name of the serialized citation index.
pub const CITATION_BLOB: &str = "citation";
/// Blob name of the [`IndexManifest`] of a completed build.
pub const MANIFEST_BLOB: &str = "manifest";
/// Blob name of the manifest a build in progress is working towards.
pub const PENDING_MANIFEST_BLOB: &str = "pending_manifest";

/// Storage error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error (filesystem, directory creation)
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Database error (redb, poisoned lock)
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Store for index blobs and per-view embedding vectors.
///
/// Writes are durable per call: a `put_vectors` that returns `Ok` survives a
/// crash of the build that follows it.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Returns the blob stored under `name`, or `None` if absent.
    async fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `bytes` under `name`, replacing any previous value.
    async fn put_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Stores a batch of vectors for one view in a single commit.
    ///
    /// Existing vectors for the same (view, id) are overwritten.
    async fn put_vectors(&self, view: View, rows: &[(DocId, Vec<f32>)])
        -> Result<(), StoreError>;

    /// All vectors stored for `view`, ordered by document id.
    async fn load_vectors(&self, view: View) -> Result<Vec<(DocId, Vec<f32>)>, StoreError>;

    /// Number of vectors stored for `view`.
    async fn vector_count(&self, view: View) -> Result<usize, StoreError>;

    /// Removes every blob and vector.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Reads and deserializes a JSON blob.
///
/// # Errors
///
/// Returns [`StoreError::SerializationError`] if the blob exists but does not
/// parse as `T`.
pub async fn get_json<S, T>(store: &S, name: &str) -> Result<Option<T>, StoreError>
where
    S: IndexStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get_blob(name).await? {
        Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            StoreError::SerializationError(format!("Failed to deserialize {}: {}", name, e))
        }),
        None => Ok(None),
    }
}

/// Serializes `value` as JSON and stores it under `name`.
pub async fn put_json<S, T>(store: &S, name: &str, value: &T) -> Result<(), StoreError>
where
    S: IndexStore + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(|e| {
        StoreError::SerializationError(format!("Failed to serialize {}: {}", name, e))
    })?;
    store.put_blob(name, &bytes).await
}

/// Packs an embedding as little-endian f32 bytes.
pub(crate) fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Inverse of [`serialize_embedding`]. Trailing bytes that do not form a
/// whole f32 are ignored.
pub(crate) fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: usize,
    }

    #[test]
    fn test_embedding_bytes_are_little_endian() {
        let bytes = serialize_embedding(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(deserialize_embedding(&bytes), vec![1.0, -0.5]);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = InMemoryIndexStore::new();
        let missing: Option<Sample> = get_json(&store, "sample").await.unwrap();
        assert!(missing.is_none());

        let sample = Sample {
            name: "citation".into(),
            count: 3,
        };
        put_json(&store, "sample", &sample).await.unwrap();
        let loaded: Option<Sample> = get_json(&store, "sample").await.unwrap();
        assert_eq!(loaded, Some(sample));
    }

    #[tokio::test]
    async fn test_get_json_reports_bad_blob() {
        let store = InMemoryIndexStore::new();
        store.put_blob("sample", b"not json").await.unwrap();
        let err = get_json::<_, Sample>(&store, "sample").await.unwrap_err();
        assert!(matches!(err, StoreError::SerializationError(_)));
    }
}
