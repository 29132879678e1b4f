//! Vector store contract and the SQLite-backed default store.
//!
//! The SQLite store keeps embeddings as BLOBs and computes similarity in Rust.
//! Brute force is fine for personal note collections; a remote store (see
//! `qdrant`) takes over when that stops being true.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::embedding::cosine_similarity;
use super::error::{Result, ScopeError};
use crate::core::document::Payload;

/// A search result as returned by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// Collection-oriented storage of `(id, vector, payload)` records.
///
/// Searching or reading from a collection that does not exist yields
/// nothing rather than an error.
pub trait VectorStore {
    fn backend(&self) -> &str;

    /// Create the collection if absent. Fails with `SchemaMismatch` when it
    /// exists with another dimension.
    fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()>;

    fn collection_dimension(&self, name: &str) -> Result<Option<usize>>;

    /// Insert or replace the record with this id.
    fn upsert(&self, collection: &str, id: &str, vector: &[f32], payload: &Payload)
        -> Result<()>;

    fn get_payload(&self, collection: &str, id: &str) -> Result<Option<Payload>>;

    /// Up to `top_k` records, score descending, ties broken by id ascending.
    fn search(&self, collection: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>>;

    fn list_collections(&self) -> Result<BTreeSet<String>>;

    fn point_ids(&self, collection: &str) -> Result<Vec<String>>;

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    fn count(&self, collection: &str) -> Result<usize>;
}

/// Order by score descending then id ascending, keep the first `top_k`.
pub(crate) fn rank(points: &mut Vec<ScoredPoint>, top_k: usize) {
    points.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
    points.truncate(top_k);
}

pub(crate) fn check_dimension(collection: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ScopeError::SchemaMismatch {
            collection: collection.to_string(),
            expected,
            actual,
        })
    }
}

fn decode_payload(json: &str) -> Result<Payload> {
    serde_json::from_str(json)
        .map_err(|e| ScopeError::StoreUnavailable(format!("unreadable payload: {}", e)))
}

/// SQLite vector store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create database at path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS points (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                payload TEXT NOT NULL,  -- JSON
                embedding BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id),
                FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScopeError::StoreUnavailable(format!("connection lock poisoned: {}", e)))
    }

    fn dimension_of(conn: &Connection, name: &str) -> Result<Option<usize>> {
        let dimension: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(dimension.map(|d| d as usize))
    }
}

impl VectorStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let conn = self.conn()?;
        match Self::dimension_of(&conn, name)? {
            Some(existing) => check_dimension(name, dimension, existing),
            None => {
                conn.execute(
                    "INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
                    params![name, dimension as i64, chrono::Utc::now().timestamp()],
                )?;
                debug!(collection = name, dimension, "created collection");
                Ok(())
            }
        }
    }

    fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        Self::dimension_of(&*self.conn()?, name)
    }

    fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: &Payload,
    ) -> Result<()> {
        let conn = self.conn()?;
        let dimension = Self::dimension_of(&conn, collection)?
            .ok_or_else(|| ScopeError::UnknownCollection(collection.to_string()))?;
        check_dimension(collection, dimension, vector.len())?;

        let payload_json = serde_json::to_string(payload)
            .map_err(|e| ScopeError::StoreUnavailable(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO points (collection, id, payload, embedding, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(collection, id) DO UPDATE SET
                payload = excluded.payload,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
            params![
                collection,
                id,
                payload_json,
                embedding_to_blob(vector),
                chrono::Utc::now().timestamp(),
            ],
        )?;

        Ok(())
    }

    fn get_payload(&self, collection: &str, id: &str) -> Result<Option<Payload>> {
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload FROM points WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        json.as_deref().map(decode_payload).transpose()
    }

    fn search(&self, collection: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, payload, embedding FROM points WHERE collection = ?1")?;

        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut points = Vec::new();
        for row in rows {
            let (id, payload_json, blob) = row?;
            points.push(ScoredPoint {
                score: cosine_similarity(vector, &blob_to_embedding(&blob)),
                payload: decode_payload(&payload_json)?,
                id,
            });
        }

        rank(&mut points, top_k);
        Ok(points)
    }

    fn list_collections(&self) -> Result<BTreeSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM collections")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(names)
    }

    fn point_ids(&self, collection: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM points WHERE collection = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![collection], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM points WHERE collection = ?1 AND id = ?2")?;
            for id in ids {
                stmt.execute(params![collection, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Convert f32 embedding to BLOB
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert BLOB to f32 embedding
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
