//! Process-local [`IndexStore`].

use super::{IndexStore, StoreError};
use crate::search::{DocId, View};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory store. Nothing survives the process; used by tests, benches
/// and one-shot runs.
#[derive(Default)]
pub struct InMemoryIndexStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    vectors: RwLock<BTreeMap<View, BTreeMap<DocId, Vec<f32>>>>,
}

impl InMemoryIndexStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(e: impl std::fmt::Display) -> StoreError {
    StoreError::DatabaseError(format!("Lock poisoned: {}", e))
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs.get(name).cloned())
    }

    async fn put_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        blobs.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn put_vectors(
        &self,
        view: View,
        rows: &[(DocId, Vec<f32>)],
    ) -> Result<(), StoreError> {
        let mut vectors = self.vectors.write().map_err(poisoned)?;
        let table = vectors.entry(view).or_default();
        for (id, vector) in rows {
            table.insert(id.clone(), vector.clone());
        }
        Ok(())
    }

    async fn load_vectors(&self, view: View) -> Result<Vec<(DocId, Vec<f32>)>, StoreError> {
        let vectors = self.vectors.read().map_err(poisoned)?;
        Ok(vectors
            .get(&view)
            .map(|table| table.iter().map(|(id, v)| (id.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn vector_count(&self, view: View) -> Result<usize, StoreError> {
        let vectors = self.vectors.read().map_err(poisoned)?;
        Ok(vectors.get(&view).map_or(0, BTreeMap::len))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.blobs.write().map_err(poisoned)?.clear();
        self.vectors.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vectors_are_per_view_and_sorted() {
        let store = InMemoryIndexStore::new();
        store
            .put_vectors(
                View::Qa,
                &[("b".into(), vec![0.0, 1.0]), ("a".into(), vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        store
            .put_vectors(View::Facts, &[("a".into(), vec![0.5, 0.5])])
            .await
            .unwrap();

        let qa = store.load_vectors(View::Qa).await.unwrap();
        assert_eq!(qa[0].0.as_str(), "a");
        assert_eq!(qa[1].0.as_str(), "b");
        assert_eq!(store.vector_count(View::Facts).await.unwrap(), 1);
        assert_eq!(store.vector_count(View::Analysis).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_overwrites_and_clear_removes() {
        let store = InMemoryIndexStore::new();
        store.put_blob("manifest", b"{}").await.unwrap();
        store
            .put_vectors(View::Qa, &[("a".into(), vec![1.0])])
            .await
            .unwrap();
        store
            .put_vectors(View::Qa, &[("a".into(), vec![2.0])])
            .await
            .unwrap();
        assert_eq!(store.load_vectors(View::Qa).await.unwrap()[0].1, vec![2.0]);

        store.clear().await.unwrap();
        assert!(store.get_blob("manifest").await.unwrap().is_none());
        assert_eq!(store.vector_count(View::Qa).await.unwrap(), 0);
    }
}
