// src/tools/vector.rs
// Vector store adapter over Qdrant (spec §4.5.2): one collection per
// declared name (food, note, conversation, document, memory), each
// prefixed so one Qdrant instance can host more than one deployment.
// Grounded on the teacher's `QdrantMultiStore`
// (examples/ConaryLabs-Mira/backend/src/memory/storage/qdrant/multi_store.rs)
// for collection-per-head layout, `ensure_collection`, and payload-filtered
// search; generalized here from the teacher's fixed 3-head set to an
// arbitrary declared collection name, and extended with the dimension
// check spec §4.5.2 requires before any network call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, GetPointsBuilder, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, Value>,
    /// Populated by `get_by_ids` (the caller needs the raw vector to rerank
    /// locally); left empty by `search`, whose `score` already reflects the
    /// store's own ANN ranking.
    pub embedding: Vec<f32>,
}

/// Storage boundary for embeddings, injected into tool handlers rather
/// than reached for as a global (spec §9: "replacing ad-hoc global state
/// with explicit capability passing"). A scripted in-memory fake for
/// tests lives alongside the real adapter the same way `ScriptedLlmAdapter`
/// does for `LlmAdapter`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        embedding: Vec<f32>,
        payload: HashMap<String, Value>,
    ) -> Result<(), CoreError>;

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter_equals: &[(&str, &str)],
    ) -> Result<Vec<VectorRecord>, CoreError>;

    /// Fetch exactly the vectors for `ids`, in no particular order, with no
    /// similarity scoring. Used where a caller already has a candidate id
    /// set from elsewhere (e.g. a structured pre-filter) and needs to rank
    /// only among those, rather than a fresh ANN `search` over the whole
    /// collection (spec §4.5 hybrid recommendation: "Retrieve vectors for
    /// the K1 candidates"). Ids with no stored vector are simply omitted.
    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>, CoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), CoreError>;
}

pub struct QdrantVectorStore {
    client: Qdrant,
    prefix: String,
    dimensions: HashMap<String, usize>,
}

impl QdrantVectorStore {
    pub async fn connect(
        url: &str,
        prefix: &str,
        dimensions: HashMap<String, usize>,
    ) -> Result<Self, CoreError> {
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| CoreError::configuration(format!("failed to connect to qdrant: {e}")))?;

        let store = Self {
            client,
            prefix: prefix.to_string(),
            dimensions,
        };
        store.ensure_collections().await?;
        Ok(store)
    }

    fn collection_name(&self, collection: &str) -> String {
        format!("{}_{}", self.prefix, collection)
    }

    fn dimension_for(&self, collection: &str) -> Result<usize, CoreError> {
        self.dimensions.get(collection).copied().ok_or_else(|| {
            CoreError::SchemaMismatch(format!("no declared vector dimension for collection {collection}"))
        })
    }

    async fn ensure_collections(&self) -> Result<(), CoreError> {
        for (name, dims) in self.dimensions.clone() {
            let full_name = self.collection_name(&name);
            let exists = self
                .client
                .collection_exists(&full_name)
                .await
                .map_err(|e| CoreError::Transient(e.to_string()))?;
            if !exists {
                info!(collection = %full_name, "creating qdrant collection");
                self.client
                    .create_collection(
                        CreateCollectionBuilder::new(&full_name)
                            .vectors_config(VectorParamsBuilder::new(dims as u64, Distance::Cosine)),
                    )
                    .await
                    .map_err(|e| CoreError::Transient(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        embedding: Vec<f32>,
        payload: HashMap<String, Value>,
    ) -> Result<(), CoreError> {
        let expected = self.dimension_for(collection)?;
        if embedding.len() != expected {
            return Err(CoreError::SchemaMismatch(format!(
                "collection {collection} expects dimension {expected}, got {}",
                embedding.len()
            )));
        }

        let full_name = self.collection_name(collection);
        let mut qdrant_payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        for (key, value) in payload {
            qdrant_payload.insert(key, json_to_qdrant_value(&value));
        }

        let numeric_id = uuid_to_point_id(id);
        let point = PointStruct::new(numeric_id, embedding, qdrant_payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&full_name, vec![point]).wait(true))
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        debug!(collection = %full_name, id, "upserted vector point");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter_equals: &[(&str, &str)],
    ) -> Result<Vec<VectorRecord>, CoreError> {
        let expected = self.dimension_for(collection)?;
        if embedding.len() != expected {
            return Err(CoreError::SchemaMismatch(format!(
                "collection {collection} expects dimension {expected}, got {}",
                embedding.len()
            )));
        }

        let full_name = self.collection_name(collection);
        let mut builder = SearchPointsBuilder::new(&full_name, embedding.to_vec(), limit as u64)
            .with_payload(true);
        if !filter_equals.is_empty() {
            let conditions: Vec<Condition> = filter_equals
                .iter()
                .map(|(k, v)| Condition::matches(*k, v.to_string()))
                .collect();
            builder = builder.filter(Filter::must(conditions));
        }

        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| VectorRecord {
                id: point_id_to_string(&point.id),
                score: point.score,
                payload: point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, qdrant_value_to_json(&v)))
                    .collect(),
                embedding: Vec::new(),
            })
            .collect())
    }

    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let full_name = self.collection_name(collection);
        let point_ids: Vec<qdrant_client::qdrant::PointId> = ids
            .iter()
            .map(|id| qdrant_client::qdrant::PointId::from(uuid_to_point_id(id)))
            .collect();

        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&full_name, point_ids)
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| VectorRecord {
                id: point_id_to_string(&point.id),
                score: 0.0,
                payload: point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, qdrant_value_to_json(&v)))
                    .collect(),
                embedding: point_vectors_to_embedding(point.vectors),
            })
            .collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), CoreError> {
        let full_name = self.collection_name(collection);
        let numeric_id = uuid_to_point_id(id);
        self.client
            .delete_points(
                qdrant_client::qdrant::DeletePointsBuilder::new(&full_name)
                    .points(vec![qdrant_client::qdrant::PointId::from(numeric_id)]),
            )
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(())
    }
}

fn uuid_to_point_id(id: &str) -> u64 {
    id.parse().unwrap_or_else(|_| {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        id.hash(&mut hasher);
        hasher.finish()
    })
}

/// Pulls the dense vector out of `get_points`' `VectorsOutput`, mirroring
/// the teacher's `point_to_entry` unwrap (backend/src/memory/storage/
/// qdrant/multi_store.rs). Missing/non-dense output just yields an empty
/// vector rather than failing the whole retrieval.
fn point_vectors_to_embedding(vectors: Option<qdrant_client::qdrant::VectorsOutput>) -> Vec<f32> {
    vectors
        .and_then(|v| match v.vectors_options {
            Some(qdrant_client::qdrant::vectors_output::VectorsOptions::Vector(vec)) => {
                match vec.into_vector() {
                    qdrant_client::qdrant::vector_output::Vector::Dense(dense) => Some(dense.data),
                    _ => None,
                }
            }
            _ => None,
        })
        .unwrap_or_default()
}

fn point_id_to_string(id: &Option<qdrant_client::qdrant::PointId>) -> String {
    match id.as_ref().and_then(|p| p.point_id_options.as_ref()) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u.clone(),
        None => Uuid::new_v4().to_string(),
    }
}

fn json_to_qdrant_value(value: &Value) -> qdrant_client::qdrant::Value {
    match value {
        Value::String(s) => s.clone().into(),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) if n.is_i64() => n.as_i64().unwrap().into(),
        Value::Number(n) => n.as_f64().unwrap_or(0.0).into(),
        other => other.to_string().into(),
    }
}

fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;
    match &value.kind {
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => Value::Number((*i).into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// In-memory scripted fake for tests (spec §8.1: "a scripted fake for
/// each external boundary"). Performs a real cosine-similarity ranking
/// over whatever was upserted, so hybrid-recommendation tests exercise
/// genuine ranking behavior without a live Qdrant instance.
pub struct InMemoryVectorStore {
    dimensions: HashMap<String, usize>,
    points: tokio::sync::Mutex<HashMap<String, Vec<(String, Vec<f32>, HashMap<String, Value>)>>>,
}

impl InMemoryVectorStore {
    pub fn new(dimensions: HashMap<String, usize>) -> Self {
        Self {
            dimensions,
            points: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn shared(dimensions: HashMap<String, usize>) -> Arc<dyn VectorStore> {
        Arc::new(Self::new(dimensions))
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        embedding: Vec<f32>,
        payload: HashMap<String, Value>,
    ) -> Result<(), CoreError> {
        let expected = self
            .dimensions
            .get(collection)
            .copied()
            .ok_or_else(|| CoreError::SchemaMismatch(format!("unknown collection {collection}")))?;
        if embedding.len() != expected {
            return Err(CoreError::SchemaMismatch(format!(
                "collection {collection} expects dimension {expected}, got {}",
                embedding.len()
            )));
        }

        let mut points = self.points.lock().await;
        let bucket = points.entry(collection.to_string()).or_default();
        bucket.retain(|(existing_id, _, _)| existing_id != id);
        bucket.push((id.to_string(), embedding, payload));
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter_equals: &[(&str, &str)],
    ) -> Result<Vec<VectorRecord>, CoreError> {
        let points = self.points.lock().await;
        let Some(bucket) = points.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<VectorRecord> = bucket
            .iter()
            .filter(|(_, _, payload)| {
                filter_equals.iter().all(|(key, value)| {
                    payload.get(*key).and_then(|v| v.as_str()) == Some(*value)
                })
            })
            .map(|(id, vector, payload)| VectorRecord {
                id: id.clone(),
                score: cosine_similarity(embedding, vector),
                payload: payload.clone(),
                embedding: vector.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorRecord>, CoreError> {
        let points = self.points.lock().await;
        let Some(bucket) = points.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(bucket
            .iter()
            .filter(|(id, _, _)| ids.iter().any(|wanted| wanted == id))
            .map(|(id, vector, payload)| VectorRecord {
                id: id.clone(),
                score: 0.0,
                payload: payload.clone(),
                embedding: vector.clone(),
            })
            .collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), CoreError> {
        let mut points = self.points.lock().await;
        if let Some(bucket) = points.get_mut(collection) {
            bucket.retain(|(existing_id, _, _)| existing_id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> HashMap<String, usize> {
        [("food".to_string(), 3)].into_iter().collect()
    }

    #[tokio::test]
    async fn upsert_rejects_mismatched_dimension() {
        let store = InMemoryVectorStore::new(dims());
        let err = store
            .upsert("food", "a", vec![1.0, 0.0], HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SchemaMismatch);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = InMemoryVectorStore::new(dims());
        store.upsert("food", "a", vec![1.0, 0.0, 0.0], HashMap::new()).await.unwrap();
        store.upsert("food", "b", vec![0.0, 1.0, 0.0], HashMap::new()).await.unwrap();

        let results = store.search("food", &[1.0, 0.0, 0.0], 2, &[]).await.unwrap();
        assert_eq!(results[0].id, "a");
    }
}
