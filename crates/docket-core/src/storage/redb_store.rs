//! Redb-backed index store.
//!
//! Uses [redb](https://github.com/cberner/redb), a pure Rust, ACID-compliant
//! embedded B-tree database, so a built index is a single file that can be
//! reopened without re-embedding the corpus.
//!
//! # Tables
//!
//! - `blobs`: name (string) -> JSON bytes (lexical index, citation index,
//!   manifest)
//! - `embeddings`: `"{view}/{doc_id}"` (string) -> `Vec<f32>` (raw bytes,
//!   little-endian)
//!
//! Keys in `embeddings` are grouped by view prefix, so loading one view is a
//! single range scan.

use super::{deserialize_embedding, serialize_embedding, IndexStore, StoreError};
use crate::search::{DocId, View};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const BLOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");
const EMBEDDINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");

/// File name of the database inside the index directory.
pub const DB_FILE_NAME: &str = "index.redb";

fn db_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::DatabaseError(format!("{}: {}", context, e))
}

fn vector_key(view: View, id: &DocId) -> String {
    format!("{}/{}", view.as_str(), id)
}

/// Half-open key range covering every vector of `view`.
///
/// `'0'` is the character after `'/'`, so `"qa/".."qa0"` spans exactly the
/// keys with the `qa/` prefix.
fn view_range(view: View) -> (String, String) {
    (format!("{}/", view.as_str()), format!("{}0", view.as_str()))
}

/// Redb-backed [`IndexStore`].
///
/// # Example
///
/// ```ignore
/// use docket_core::storage::RedbIndexStore;
///
/// let store = RedbIndexStore::open_dir("./.docket")?;
/// let qa_vectors = store.load_vectors(View::Qa).await?;
/// ```
pub struct RedbIndexStore {
    db: Arc<Database>,
}

impl RedbIndexStore {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates the database file and both tables if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| db_err("Failed to open database", e))?;

        {
            let write_txn = db
                .begin_write()
                .map_err(|e| db_err("Failed to begin write transaction", e))?;
            write_txn
                .open_table(BLOBS_TABLE)
                .map_err(|e| db_err("Failed to create blobs table", e))?;
            write_txn
                .open_table(EMBEDDINGS_TABLE)
                .map_err(|e| db_err("Failed to create embeddings table", e))?;
            write_txn
                .commit()
                .map_err(|e| db_err("Failed to commit table creation", e))?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    /// Opens `{dir}/index.redb`, creating the directory if needed.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::IoError(format!("{}: {}", dir.display(), e)))?;
        Self::open(dir.join(DB_FILE_NAME))
    }
}

#[async_trait]
impl IndexStore for RedbIndexStore {
    async fn get_blob(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_err("Failed to begin read transaction", e))?;
        let table = read_txn
            .open_table(BLOBS_TABLE)
            .map_err(|e| db_err("Failed to open blobs table", e))?;

        match table.get(name) {
            Ok(Some(guard)) => Ok(Some(guard.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err("Failed to get blob", e)),
        }
    }

    async fn put_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(BLOBS_TABLE)
                .map_err(|e| db_err("Failed to open blobs table", e))?;
            table
                .insert(name, bytes)
                .map_err(|e| db_err("Failed to insert blob", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit blob", e))?;
        Ok(())
    }

    async fn put_vectors(
        &self,
        view: View,
        rows: &[(DocId, Vec<f32>)],
    ) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(EMBEDDINGS_TABLE)
                .map_err(|e| db_err("Failed to open embeddings table", e))?;
            for (id, vector) in rows {
                let key = vector_key(view, id);
                let bytes = serialize_embedding(vector);
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| db_err("Failed to insert embedding", e))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit embeddings", e))?;

        debug!(view = %view, rows = rows.len(), "Committed embedding batch");
        Ok(())
    }

    async fn load_vectors(&self, view: View) -> Result<Vec<(DocId, Vec<f32>)>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_err("Failed to begin read transaction", e))?;
        let table = read_txn
            .open_table(EMBEDDINGS_TABLE)
            .map_err(|e| db_err("Failed to open embeddings table", e))?;

        let (start, end) = view_range(view);
        let prefix_len = start.len();
        let range = table
            .range(start.as_str()..end.as_str())
            .map_err(|e| db_err("Failed to scan embeddings", e))?;

        let mut vectors = Vec::new();
        for entry in range {
            let (key, value) = entry.map_err(|e| db_err("Failed to read embedding entry", e))?;
            let id = DocId::new(&key.value()[prefix_len..]);
            vectors.push((id, deserialize_embedding(value.value())));
        }
        Ok(vectors)
    }

    async fn vector_count(&self, view: View) -> Result<usize, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_err("Failed to begin read transaction", e))?;
        let table = read_txn
            .open_table(EMBEDDINGS_TABLE)
            .map_err(|e| db_err("Failed to open embeddings table", e))?;

        let (start, end) = view_range(view);
        let range = table
            .range(start.as_str()..end.as_str())
            .map_err(|e| db_err("Failed to scan embeddings", e))?;
        Ok(range.count())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_err("Failed to begin write transaction", e))?;

        for (table, name) in [(BLOBS_TABLE, "blobs"), (EMBEDDINGS_TABLE, "embeddings")] {
            write_txn
                .delete_table(table)
                .map_err(|e| db_err(&format!("Failed to drop {} table", name), e))?;
            write_txn
                .open_table(table)
                .map_err(|e| db_err(&format!("Failed to recreate {} table", name), e))?;
        }

        write_txn
            .commit()
            .map_err(|e| db_err("Failed to commit clear", e))?;
        Ok(())
    }
}
