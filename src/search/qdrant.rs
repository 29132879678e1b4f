//! Qdrant vector store backend.
//!
//! Talks to a Qdrant server over gRPC with [qdrant-client]. The client is
//! async; the engine is not, so each call is driven to completion on a
//! private current-thread runtime.
//!
//! [qdrant-client]: https://docs.rs/qdrant-client

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    GetPointsBuilder, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant, QdrantError};
use tokio::runtime::Runtime;
use tracing::debug;

use super::error::{Result, ScopeError};
use super::vectordb::{check_dimension, rank, ScoredPoint, VectorStore};
use crate::core::document::Payload;

const SCROLL_PAGE: u32 = 256;

pub struct QdrantStore {
    client: Qdrant,
    runtime: Runtime,
}

impl QdrantStore {
    /// Connect to the gRPC endpoint at `host:port`.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let url = format!("http://{}:{}", host, port);
        let client = Qdrant::from_url(&url).build().map_err(map_err)?;
        debug!(url, "connected to qdrant");
        Ok(Self { client, runtime })
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, QdrantError>>,
    {
        self.runtime.block_on(fut).map_err(map_err)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        self.block_on(self.client.collection_exists(name))
    }
}

fn map_err(e: QdrantError) -> ScopeError {
    ScopeError::StoreUnavailable(format!("qdrant: {}", e))
}

/// Size of the single unnamed vector a collection is configured with.
fn vector_size(collection: &str, config: Option<VectorsConfigKind>) -> Result<usize> {
    let reason = match config {
        Some(VectorsConfigKind::Params(params)) => return Ok(params.size as usize),
        Some(VectorsConfigKind::ParamsMap(_)) => "uses named vectors",
        None => "has no vector configuration",
    };
    Err(ScopeError::IncompatibleSchema {
        collection: collection.to_string(),
        reason: reason.to_string(),
    })
}

fn point_id_string(id: Option<&PointId>) -> String {
    match id.and_then(|pid| pid.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(s)) => s.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn to_json(value: &QdrantValue) -> serde_json::Value {
    use serde_json::Value as Json;

    match &value.kind {
        Some(Kind::BoolValue(b)) => Json::Bool(*b),
        Some(Kind::IntegerValue(i)) => Json::from(*i),
        // integral doubles come back from integer payload fields
        Some(Kind::DoubleValue(d)) if d.fract() == 0.0 && *d >= 0.0 => Json::from(*d as u64),
        Some(Kind::DoubleValue(d)) => Json::from(*d),
        Some(Kind::StringValue(s)) => Json::String(s.clone()),
        Some(Kind::ListValue(list)) => Json::Array(list.values.iter().map(to_json).collect()),
        Some(Kind::StructValue(s)) => Json::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => Json::Null,
    }
}

fn decode_payload(fields: &HashMap<String, QdrantValue>) -> Result<Payload> {
    let object: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), to_json(v)))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| ScopeError::StoreUnavailable(format!("unreadable payload: {}", e)))
}

fn encode_payload(payload: &Payload) -> Result<QdrantPayload> {
    let json =
        serde_json::to_value(payload).map_err(|e| ScopeError::StoreUnavailable(e.to_string()))?;
    QdrantPayload::try_from(json).map_err(map_err)
}

impl VectorStore for QdrantStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if let Some(existing) = self.collection_dimension(name)? {
            return check_dimension(name, dimension, existing);
        }

        self.block_on(self.client.create_collection(
            CreateCollectionBuilder::new(name)
                .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
        ))?;
        debug!(collection = name, dimension, "created qdrant collection");
        Ok(())
    }

    fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        if !self.exists(name)? {
            return Ok(None);
        }

        let info = self.block_on(self.client.collection_info(name))?;
        let config = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        vector_size(name, config).map(Some)
    }

    fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        payload: &Payload,
    ) -> Result<()> {
        let dimension = self
            .collection_dimension(collection)?
            .ok_or_else(|| ScopeError::UnknownCollection(collection.to_string()))?;
        check_dimension(collection, dimension, vector.len())?;

        let point = PointStruct::new(id.to_string(), vector.to_vec(), encode_payload(payload)?);
        self.block_on(
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true)),
        )?;
        Ok(())
    }

    fn get_payload(&self, collection: &str, id: &str) -> Result<Option<Payload>> {
        if !self.exists(collection)? {
            return Ok(None);
        }

        let response = self.block_on(
            self.client.get_points(
                GetPointsBuilder::new(collection, vec![PointId::from(id.to_string())])
                    .with_payload(true)
                    .with_vectors(false),
            ),
        )?;

        response
            .result
            .first()
            .map(|point| decode_payload(&point.payload))
            .transpose()
    }

    fn search(&self, collection: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>> {
        if !self.exists(collection)? {
            return Ok(Vec::new());
        }

        let response = self.block_on(
            self.client.search_points(
                SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64)
                    .with_payload(true),
            ),
        )?;

        let mut points = response
            .result
            .iter()
            .map(|scored| {
                Ok(ScoredPoint {
                    id: point_id_string(scored.id.as_ref()),
                    score: scored.score,
                    payload: decode_payload(&scored.payload)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        rank(&mut points, top_k);
        Ok(points)
    }

    fn list_collections(&self) -> Result<BTreeSet<String>> {
        let response = self.block_on(self.client.list_collections())?;
        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    fn point_ids(&self, collection: &str) -> Result<Vec<String>> {
        if !self.exists(collection)? {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(collection)
                .limit(SCROLL_PAGE)
                .with_payload(false)
                .with_vectors(false);
            if let Some(next) = offset.take() {
                request = request.offset(next);
            }

            let page = self.block_on(self.client.scroll(request))?;
            ids.extend(page.result.iter().map(|p| point_id_string(p.id.as_ref())));

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.clone())).collect();
        self.block_on(
            self.client.delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            ),
        )?;
        debug!(collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<usize> {
        if !self.exists(collection)? {
            return Ok(0);
        }

        let response =
            self.block_on(self.client.count(CountPointsBuilder::new(collection).exact(true)))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
