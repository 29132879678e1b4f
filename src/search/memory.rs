//! In-process vector store.
//!
//! Same contract as the SQLite store, nothing persisted. Used by tests and
//! for throwaway indexes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::embedding::cosine_similarity;
use super::error::{Result, ScopeError};
use super::vectordb::{check_dimension, rank, ScoredPoint, VectorStore};
use crate::core::document::Payload;

struct Collection {
    dimension: usize,
    points: BTreeMap<String, (Vec<f32>, Payload)>,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> Result<MutexGuard<'_, BTreeMap<String, Collection>>> {
        self.collections
            .lock()
            .map_err(|e| ScopeError::StoreUnavailable(format!("store lock poisoned: {}", e)))
    }
}

impl VectorStore for MemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections()?;
        match collections.get(name) {
            Some(existing) => check_dimension(name, dimension, existing.dimension),
            None => {
                collections.insert(
                    name.to_string(),
                    Collection {
                        dimension,
                        points: BTreeMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.collections()?.get(name).map(|c| c.dimension))
    }

    fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: &Payload,
    ) -> Result<()> {
        let mut collections = self.collections()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| ScopeError::UnknownCollection(collection.to_string()))?;
        check_dimension(collection, target.dimension, vector.len())?;

        target
            .points
            .insert(id.to_string(), (vector.to_vec(), payload.clone()));
        Ok(())
    }

    fn get_payload(&self, collection: &str, id: &str) -> Result<Option<Payload>> {
        Ok(self
            .collections()?
            .get(collection)
            .and_then(|c| c.points.get(id))
            .map(|(_, payload)| payload.clone()))
    }

    fn search(&self, collection: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut points: Vec<ScoredPoint> = target
            .points
            .iter()
            .map(|(id, (stored, payload))| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .collect();

        rank(&mut points, top_k);
        Ok(points)
    }

    fn list_collections(&self) -> Result<BTreeSet<String>> {
        Ok(self.collections()?.keys().cloned().collect())
    }

    fn point_ids(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self
            .collections()?
            .get(collection)
            .map(|c| c.points.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if let Some(target) = self.collections()?.get_mut(collection) {
            for id in ids {
                target.points.remove(id);
            }
        }
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .collections()?
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0))
    }
}
