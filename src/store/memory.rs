//! Exact in-process engine
//!
//! Brute-force scoring over every stored point: cosine for dense spaces, dot
//! product (optionally IDF-weighted) for sparse spaces, MaxSim for multivector
//! spaces. No approximate index is built, so `hnsw_m` is only recorded.

use super::{
    CollectionMetadata, CollectionSpec, FieldIndexKind, MatchFilter, PointId, PointRecord,
    QueryRequest, ScoredPoint, SpaceConfig, SparseModifier, SparseVector, VectorData, VectorSpace,
    VectorStore,
};
use crate::error::{Result, TrilaneError};
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use ndarray::{Array2, ArrayView1};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

struct StoredPoint {
    vectors: AHashMap<String, VectorData>,
    payload: serde_json::Map<String, serde_json::Value>,
}

struct MemoryCollection {
    spec: CollectionSpec,
    points: BTreeMap<PointId, StoredPoint>,
    field_indexes: AHashSet<String>,
}

/// In-process [`VectorStore`]
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<AHashMap<String, MemoryCollection>>,
    mutations: AtomicU64,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls that reached the engine
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Simulate the engine becoming unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    /// Current index-construction fan-out of a space
    pub async fn index_construction(&self, collection: &str, space: &str) -> Option<u64> {
        let collections = self.collections.read().await;
        let space = collections.get(collection)?.spec.space(space)?;
        match space.config {
            SpaceConfig::Dense { hnsw_m, .. } | SpaceConfig::Multivector { hnsw_m, .. } => {
                Some(hnsw_m)
            }
            SpaceConfig::Sparse { .. } => None,
        }
    }

    pub async fn has_field_index(&self, collection: &str, field: &str) -> bool {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.field_indexes.contains(field))
            .unwrap_or(false)
    }

    /// Payload of a stored point, for inspection
    pub async fn payload(
        &self,
        collection: &str,
        id: &PointId,
    ) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.collections
            .read()
            .await
            .get(collection)?
            .points
            .get(id)
            .map(|p| p.payload.clone())
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TrilaneError::StorageUnavailable(
                "memory engine is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

fn missing_collection(name: &str) -> TrilaneError {
    TrilaneError::StorageUnavailable(format!("Collection '{}' not found", name))
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(&spec.name) {
            return Err(TrilaneError::StorageUnavailable(format!(
                "Collection '{}' already exists",
                spec.name
            )));
        }
        collections.insert(
            spec.name.clone(),
            MemoryCollection {
                spec: spec.clone(),
                points: BTreeMap::new(),
                field_indexes: AHashSet::new(),
            },
        );
        self.mutated();
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<Vec<VectorSpace>> {
        self.check_online()?;
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing_collection(name))?;
        Ok(collection.spec.spaces.clone())
    }

    async fn collection_metadata(&self, name: &str) -> Result<CollectionMetadata> {
        self.check_online()?;
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing_collection(name))?;
        Ok(collection.spec.metadata.clone())
    }

    async fn update_collection_metadata(
        &self,
        name: &str,
        metadata: CollectionMetadata,
    ) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(name)
            .ok_or_else(|| missing_collection(name))?;
        target.spec.metadata.extend(metadata);
        self.mutated();
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
        _wait: bool,
    ) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;

        for point in &points {
            for (space, vector) in &point.vectors {
                validate_vector(&target.spec, space, vector)?;
            }
        }

        for point in points {
            target.points.insert(
                point.id,
                StoredPoint {
                    vectors: point.vectors.into_iter().collect(),
                    payload: point.payload,
                },
            );
        }
        self.mutated();
        Ok(())
    }

    async fn update_index_construction(
        &self,
        collection: &str,
        space: &str,
        new_m: u64,
    ) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        let entry = target
            .spec
            .spaces
            .iter_mut()
            .find(|s| s.name == space)
            .ok_or_else(|| {
                TrilaneError::StorageUnavailable(format!("Unknown vector space '{}'", space))
            })?;

        match &mut entry.config {
            SpaceConfig::Dense { hnsw_m, .. } | SpaceConfig::Multivector { hnsw_m, .. } => {
                *hnsw_m = new_m;
            }
            SpaceConfig::Sparse { .. } => {
                return Err(TrilaneError::StorageUnavailable(format!(
                    "Sparse space '{}' has no graph index",
                    space
                )))
            }
        }
        self.mutated();
        Ok(())
    }

    async fn create_field_index(
        &self,
        collection: &str,
        field: &str,
        _kind: FieldIndexKind,
    ) -> Result<()> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        target.field_indexes.insert(field.to_string());
        self.mutated();
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredPoint>> {
        self.check_online()?;
        let collections = self.collections.read().await;
        let collection = collections
            .get(&request.collection)
            .ok_or_else(|| missing_collection(&request.collection))?;

        // Union of prefetch candidates, first occurrence wins
        let mut seen = AHashSet::new();
        let mut candidates: Vec<&PointId> = Vec::new();
        if request.prefetch.is_empty() {
            candidates.extend(
                collection
                    .points
                    .iter()
                    .filter(|(_, p)| matches_filter(p, request.filter.as_ref()))
                    .map(|(id, _)| id),
            );
        } else {
            for prefetch in &request.prefetch {
                let hits = collection.search(
                    &prefetch.using,
                    &prefetch.query,
                    prefetch.filter.as_ref(),
                    prefetch.limit as usize,
                )?;
                for (id, _) in hits {
                    if seen.insert(id) {
                        candidates.push(id);
                    }
                }
            }
        }

        let mut scored = Vec::with_capacity(candidates.len());
        for id in candidates {
            let point = &collection.points[id];
            if !matches_filter(point, request.filter.as_ref()) {
                continue;
            }
            if let Some(score) = collection.score(point, &request.using, &request.query)? {
                scored.push((id, score));
            }
        }

        // Stable: ties keep prefetch order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(request.limit as usize);

        Ok(scored
            .into_iter()
            .map(|(id, score)| {
                let payload = &collection.points[id].payload;
                let selected = request
                    .payload_fields
                    .iter()
                    .filter_map(|f| payload.get(f).map(|v| (f.clone(), v.clone())))
                    .collect();
                ScoredPoint {
                    id: id.clone(),
                    score,
                    payload: selected,
                }
            })
            .collect())
    }

    async fn health(&self) -> Result<()> {
        self.check_online()
    }
}

impl MemoryCollection {
    /// Top-`limit` points of one space under an optional filter
    fn search(
        &self,
        space: &str,
        query: &VectorData,
        filter: Option<&MatchFilter>,
        limit: usize,
    ) -> Result<Vec<(&PointId, f32)>> {
        let mut hits = Vec::new();
        for (id, point) in &self.points {
            if !matches_filter(point, filter) {
                continue;
            }
            if let Some(score) = self.score(point, space, query)? {
                hits.push((id, score));
            }
        }
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Score of `point` in `space`; `None` when the point has no vector there
    /// or, for sparse spaces, shares no term with the query
    fn score(&self, point: &StoredPoint, space: &str, query: &VectorData) -> Result<Option<f32>> {
        let config = &self
            .spec
            .space(space)
            .ok_or_else(|| {
                TrilaneError::StorageUnavailable(format!("Unknown vector space '{}'", space))
            })?
            .config;
        let Some(stored) = point.vectors.get(space) else {
            return Ok(None);
        };

        match (config, query, stored) {
            (SpaceConfig::Dense { .. }, VectorData::Dense(q), VectorData::Dense(d)) => {
                Ok(Some(cosine(q, d)))
            }
            (SpaceConfig::Sparse { modifier }, VectorData::Sparse(q), VectorData::Sparse(d)) => {
                let idf = |term: u32| match modifier {
                    SparseModifier::Idf => self.idf(space, term),
                    SparseModifier::None => 1.0,
                };
                Ok(sparse_dot(q, d, idf))
            }
            (SpaceConfig::Multivector { .. }, VectorData::Multi(q), VectorData::Multi(d)) => {
                max_sim(q, d).map(Some)
            }
            _ => Err(TrilaneError::StorageUnavailable(format!(
                "Query vector kind does not match space '{}'",
                space
            ))),
        }
    }

    fn idf(&self, space: &str, term: u32) -> f32 {
        let mut total = 0usize;
        let mut containing = 0usize;
        for point in self.points.values() {
            if let Some(VectorData::Sparse(v)) = point.vectors.get(space) {
                total += 1;
                if v.indices.contains(&term) {
                    containing += 1;
                }
            }
        }
        let n = total as f32;
        let df = containing as f32;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }
}

fn matches_filter(point: &StoredPoint, filter: Option<&MatchFilter>) -> bool {
    match filter {
        None => true,
        Some(f) => point
            .payload
            .get(&f.field)
            .and_then(|v| v.as_str())
            .map(|v| v == f.value)
            .unwrap_or(false),
    }
}

fn validate_vector(spec: &CollectionSpec, space: &str, vector: &VectorData) -> Result<()> {
    let config = &spec
        .space(space)
        .ok_or_else(|| TrilaneError::StorageUnavailable(format!("Unknown vector space '{}'", space)))?
        .config;

    let ok = match (config, vector) {
        (SpaceConfig::Dense { size, .. }, VectorData::Dense(v)) => v.len() as u64 == *size,
        (SpaceConfig::Sparse { .. }, VectorData::Sparse(v)) => v.indices.len() == v.values.len(),
        (SpaceConfig::Multivector { size, .. }, VectorData::Multi(tokens)) => {
            !tokens.is_empty() && tokens.iter().all(|t| t.len() as u64 == *size)
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(TrilaneError::StorageUnavailable(format!(
            "Vector does not fit space '{}' ({})",
            space,
            config.kind()
        )))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        a.dot(&b) / denom
    }
}

fn sparse_dot(query: &SparseVector, doc: &SparseVector, idf: impl Fn(u32) -> f32) -> Option<f32> {
    let weights: AHashMap<u32, f32> = doc
        .indices
        .iter()
        .copied()
        .zip(doc.values.iter().copied())
        .collect();

    let mut overlap = false;
    let mut score = 0.0;
    for (term, qw) in query.indices.iter().zip(query.values.iter()) {
        if let Some(dw) = weights.get(term) {
            overlap = true;
            score += qw * dw * idf(*term);
        }
    }
    overlap.then_some(score)
}

fn normalized_rows(tokens: &[Vec<f32>]) -> Result<Array2<f32>> {
    let dim = tokens.first().map(|t| t.len()).unwrap_or(0);
    let flat: Vec<f32> = tokens.iter().flat_map(|t| t.iter().copied()).collect();
    let mut matrix = Array2::from_shape_vec((tokens.len(), dim), flat).map_err(|e| {
        TrilaneError::StorageUnavailable(format!("Ragged multivector: {}", e))
    })?;
    for mut row in matrix.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
    Ok(matrix)
}

/// Sum over query tokens of the best cosine match among document tokens
pub(crate) fn max_sim(query: &[Vec<f32>], doc: &[Vec<f32>]) -> Result<f32> {
    if query.is_empty() || doc.is_empty() {
        return Ok(0.0);
    }
    let q = normalized_rows(query)?;
    let d = normalized_rows(doc)?;
    if q.ncols() != d.ncols() {
        return Err(TrilaneError::StorageUnavailable(format!(
            "Multivector dimension mismatch: {} vs {}",
            q.ncols(),
            d.ncols()
        )));
    }

    let sims = q.dot(&d.t());
    Ok(sims
        .rows()
        .into_iter()
        .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Distance, MultivectorComparator, Prefetch, Quantization};
    use serde_json::json;

    fn spec() -> CollectionSpec {
        CollectionSpec {
            name: "docs".to_string(),
            spaces: vec![
                VectorSpace {
                    name: "dense".to_string(),
                    config: SpaceConfig::Dense {
                        size: 2,
                        distance: Distance::Cosine,
                        quantization: Quantization::None,
                        always_ram: false,
                        on_disk: false,
                        hnsw_m: 0,
                    },
                },
                VectorSpace {
                    name: "sparse".to_string(),
                    config: SpaceConfig::Sparse {
                        modifier: SparseModifier::Idf,
                    },
                },
                VectorSpace {
                    name: "late".to_string(),
                    config: SpaceConfig::Multivector {
                        size: 2,
                        distance: Distance::Cosine,
                        comparator: MultivectorComparator::MaxSim,
                        hnsw_m: 0,
                    },
                },
            ],
            shard_number: 1,
            replication_factor: 1,
            metadata: serde_json::Map::new(),
        }
    }

    fn point(id: u64, dense: [f32; 2], term: u32, tenant: &str) -> PointRecord {
        let mut payload = serde_json::Map::new();
        payload.insert("user_id".to_string(), json!(tenant));
        payload.insert("title".to_string(), json!(format!("doc {}", id)));
        PointRecord {
            id: PointId::Num(id),
            vectors: vec![
                ("dense".to_string(), VectorData::Dense(dense.to_vec())),
                (
                    "sparse".to_string(),
                    VectorData::Sparse(SparseVector::new(vec![term], vec![1.0])),
                ),
                ("late".to_string(), VectorData::Multi(vec![dense.to_vec()])),
            ],
            payload,
        }
    }

    #[test]
    fn test_max_sim_sums_best_matches() {
        let query = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let doc = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
        let score = max_sim(&query, &doc).unwrap();
        assert!((score - 2.0).abs() < 1e-5);

        let partial = vec![vec![1.0, 0.0]];
        let score = max_sim(&query, &partial).unwrap();
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_max_sim_rejects_mismatched_dims() {
        let query = vec![vec![1.0, 0.0]];
        let doc = vec![vec![1.0, 0.0, 0.0]];
        assert!(max_sim(&query, &doc).is_err());
    }

    #[test]
    fn test_sparse_dot_requires_overlap() {
        let q = SparseVector::new(vec![1, 2], vec![1.0, 0.5]);
        let d = SparseVector::new(vec![3], vec![1.0]);
        assert_eq!(sparse_dot(&q, &d, |_| 1.0), None);

        let d = SparseVector::new(vec![2, 3], vec![2.0, 1.0]);
        assert_eq!(sparse_dot(&q, &d, |_| 1.0), Some(1.0));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let store = MemoryStore::new();
        store.create_collection(&spec()).await.unwrap();

        let mut bad = point(1, [1.0, 0.0], 1, "user_0");
        bad.vectors[0] = ("dense".to_string(), VectorData::Dense(vec![1.0, 0.0, 0.0]));

        let result = store.upsert_points("docs", vec![bad], true).await;
        assert!(result.is_err());
        assert_eq!(store.point_count("docs").await, 0);
    }

    #[tokio::test]
    async fn test_query_dedups_and_filters() {
        let store = MemoryStore::new();
        store.create_collection(&spec()).await.unwrap();
        store
            .upsert_points(
                "docs",
                vec![
                    point(1, [1.0, 0.0], 7, "user_0"),
                    point(2, [0.9, 0.1], 7, "user_1"),
                    point(3, [0.0, 1.0], 8, "user_0"),
                ],
                true,
            )
            .await
            .unwrap();

        let filter = Some(MatchFilter {
            field: "user_id".to_string(),
            value: "user_0".to_string(),
        });
        let request = QueryRequest {
            collection: "docs".to_string(),
            prefetch: vec![
                Prefetch {
                    using: "dense".to_string(),
                    query: VectorData::Dense(vec![1.0, 0.0]),
                    limit: 10,
                    filter: filter.clone(),
                },
                Prefetch {
                    using: "sparse".to_string(),
                    query: VectorData::Sparse(SparseVector::new(vec![7], vec![1.0])),
                    limit: 10,
                    filter: filter.clone(),
                },
            ],
            query: VectorData::Multi(vec![vec![1.0, 0.0]]),
            using: "late".to_string(),
            filter,
            limit: 10,
            payload_fields: vec!["user_id".to_string()],
        };

        let results = store.query(request).await.unwrap();
        let ids: Vec<PointId> = results.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![PointId::Num(1), PointId::Num(3)]);
        assert!(results.iter().all(|r| r.payload["user_id"] == "user_0"));
        assert!(results.iter().all(|r| !r.payload.contains_key("title")));
    }

    #[tokio::test]
    async fn test_offline_engine() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(store.health().await.is_err());
        assert!(store.collection_exists("docs").await.is_err());
        store.set_offline(false);
        assert!(store.health().await.is_ok());
    }

    #[tokio::test]
    async fn test_metadata_merges() {
        let store = MemoryStore::new();
        let mut spec = spec();
        spec.metadata.insert("owner".to_string(), json!("search"));
        store.create_collection(&spec).await.unwrap();

        let mut update = serde_json::Map::new();
        update.insert("reranked".to_string(), json!(false));
        store.update_collection_metadata("docs", update).await.unwrap();

        let metadata = store.collection_metadata("docs").await.unwrap();
        assert_eq!(metadata["owner"], "search");
        assert_eq!(metadata["reranked"], false);
        assert!(store.collection_metadata("missing").await.is_err());
    }
}
