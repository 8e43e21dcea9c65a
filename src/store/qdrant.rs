//! Qdrant binding for the storage engine boundary

use super::{
    CollectionMetadata, CollectionSpec, FieldIndexKind, MatchFilter, PointId, PointRecord,
    QueryRequest, ScoredPoint, SpaceConfig, SparseModifier, VectorData, VectorSpace, VectorStore,
};
use crate::error::{Result, TrilaneError};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, quantization_config, value::Kind, vectors_config,
    vectors_config_diff, with_payload_selector::SelectorOptions, BinaryQuantizationBuilder,
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, FieldType, Filter,
    HnswConfigDiff, HnswConfigDiffBuilder, Memory, Modifier, MultiVectorComparator,
    MultiVectorConfigBuilder, NamedVectors, PayloadIncludeSelector, PointStruct,
    PrefetchQueryBuilder, Query, QueryPointsBuilder, SparseVectorConfig, SparseVectorParams,
    UpdateCollectionBuilder, UpsertPointsBuilder, Vector, VectorInput, VectorParams,
    VectorParamsBuilder, VectorParamsDiff, VectorParamsDiffMap, VectorParamsMap, VectorsConfig,
    VectorsConfigDiff,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use std::time::Duration;

/// [`VectorStore`] backed by a Qdrant cluster
pub struct QdrantStore {
    client: Qdrant,
    url: String,
}

impl QdrantStore {
    /// Connect to a Qdrant endpoint (gRPC port)
    pub fn connect(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        tracing::info!("Creating Qdrant client for {}", url);

        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .timeout(timeout)
            .build()
            .map_err(storage_error)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn storage_error(e: impl std::fmt::Display) -> TrilaneError {
    TrilaneError::StorageUnavailable(e.to_string())
}

fn hnsw(m: u64) -> HnswConfigDiff {
    HnswConfigDiffBuilder::default().m(m).build()
}

fn to_filter(filter: &MatchFilter) -> Filter {
    Filter::must([Condition::matches(
        filter.field.clone(),
        filter.value.clone(),
    )])
}

fn to_vector_input(data: &VectorData) -> VectorInput {
    match data {
        VectorData::Dense(v) => VectorInput::new_dense(v.clone()),
        VectorData::Sparse(s) => VectorInput::new_sparse(s.indices.clone(), s.values.clone()),
        VectorData::Multi(tokens) => VectorInput::new_multi(tokens.clone()),
    }
}

fn to_vector(data: VectorData) -> Vector {
    match data {
        VectorData::Dense(v) => Vector::new_dense(v),
        VectorData::Sparse(s) => Vector::new_sparse(s.indices, s.values),
        VectorData::Multi(tokens) => Vector::new_multi(tokens),
    }
}

fn to_point_id(id: PointId) -> qdrant_client::qdrant::PointId {
    match id {
        PointId::Num(n) => n.into(),
        PointId::Uuid(u) => u.into(),
    }
}

fn from_point_id(id: Option<qdrant_client::qdrant::PointId>) -> Result<PointId> {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(n)) => Ok(PointId::Num(n)),
        Some(PointIdOptions::Uuid(u)) => Ok(PointId::Uuid(u)),
        None => Err(TrilaneError::StorageUnavailable(
            "Engine returned a point without id".to_string(),
        )),
    }
}

fn to_json(value: qdrant_client::qdrant::Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields.into_iter().map(|(k, v)| (k, to_json(v))).collect(),
        ),
    }
}

/// Prefetch stages, multivector rerank and payload include-selector, without vectors
fn query_points(request: &QueryRequest) -> QueryPointsBuilder {
    let mut builder = QueryPointsBuilder::new(request.collection.clone());

    for prefetch in &request.prefetch {
        let mut stage = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(to_vector_input(&prefetch.query)))
            .using(prefetch.using.clone())
            .limit(prefetch.limit);
        if let Some(filter) = &prefetch.filter {
            stage = stage.filter(to_filter(filter));
        }
        builder = builder.add_prefetch(stage);
    }

    builder = builder
        .query(Query::new_nearest(to_vector_input(&request.query)))
        .using(request.using.clone())
        .limit(request.limit)
        .with_vectors(false)
        .with_payload(SelectorOptions::Include(PayloadIncludeSelector {
            fields: request.payload_fields.clone(),
        }));
    if let Some(filter) = &request.filter {
        builder = builder.filter(to_filter(filter));
    }
    builder
}

fn to_metadata(metadata: CollectionMetadata) -> HashMap<String, serde_json::Value> {
    metadata.into_iter().collect()
}

fn vector_params(config: &SpaceConfig) -> Option<VectorParams> {
    match config {
        SpaceConfig::Dense {
            size,
            quantization,
            always_ram,
            on_disk,
            hnsw_m,
            ..
        } => {
            let mut builder =
                VectorParamsBuilder::new(*size, qdrant_client::qdrant::Distance::Cosine)
                    .hnsw_config(hnsw(*hnsw_m));
            if let super::Quantization::Binary = quantization {
                let mut binary = BinaryQuantizationBuilder::default();
                if *always_ram {
                    binary = binary.memory(Memory::Pinned);
                }
                builder = builder.quantization_config(binary);
            }
            if *on_disk {
                builder = builder.memory(Memory::Cold);
            }
            Some(builder.build())
        }
        SpaceConfig::Multivector { size, hnsw_m, .. } => Some(
            VectorParamsBuilder::new(*size, qdrant_client::qdrant::Distance::Cosine)
                .hnsw_config(hnsw(*hnsw_m))
                .multivector_config(MultiVectorConfigBuilder::new(MultiVectorComparator::MaxSim))
                .build(),
        ),
        SpaceConfig::Sparse { .. } => None,
    }
}

/// Reconstruct a [`SpaceConfig`] from what the engine reports
fn space_from_params(params: &VectorParams) -> SpaceConfig {
    let hnsw_m = params
        .hnsw_config
        .as_ref()
        .and_then(|h| h.m)
        .unwrap_or_default();
    if params.multivector_config.is_some() {
        return SpaceConfig::Multivector {
            size: params.size,
            distance: super::Distance::Cosine,
            comparator: super::MultivectorComparator::MaxSim,
            hnsw_m,
        };
    }

    let binary = match params
        .quantization_config
        .as_ref()
        .and_then(|q| q.quantization.as_ref())
    {
        Some(quantization_config::Quantization::Binary(b)) => Some(b),
        _ => None,
    };
    SpaceConfig::Dense {
        size: params.size,
        distance: super::Distance::Cosine,
        quantization: if binary.is_some() {
            super::Quantization::Binary
        } else {
            super::Quantization::None
        },
        always_ram: binary.is_some_and(|b| b.memory == Some(Memory::Pinned as i32)),
        on_disk: params.memory == Some(Memory::Cold as i32),
        hnsw_m,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client
            .collection_exists(name)
            .await
            .map_err(storage_error)
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut dense_map = HashMap::new();
        let mut sparse_map = HashMap::new();

        for space in &spec.spaces {
            match &space.config {
                SpaceConfig::Sparse { modifier } => {
                    let modifier = match modifier {
                        SparseModifier::Idf => Some(Modifier::Idf.into()),
                        SparseModifier::None => None,
                    };
                    sparse_map.insert(
                        space.name.clone(),
                        SparseVectorParams {
                            modifier,
                            ..Default::default()
                        },
                    );
                }
                other => {
                    if let Some(params) = vector_params(other) {
                        dense_map.insert(space.name.clone(), params);
                    }
                }
            }
        }

        let mut builder = CreateCollectionBuilder::new(spec.name.clone())
            .vectors_config(VectorsConfig {
                config: Some(vectors_config::Config::ParamsMap(VectorParamsMap {
                    map: dense_map,
                })),
            })
            .sparse_vectors_config(SparseVectorConfig { map: sparse_map })
            .shard_number(spec.shard_number)
            .replication_factor(spec.replication_factor);
        if !spec.metadata.is_empty() {
            builder = builder.metadata(to_metadata(spec.metadata.clone()));
        }

        self.client
            .create_collection(builder)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<Vec<VectorSpace>> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(storage_error)?
            .result
            .ok_or_else(|| storage_error(format!("No info for collection '{}'", name)))?;

        let params = info
            .config
            .and_then(|c| c.params)
            .ok_or_else(|| storage_error(format!("No params for collection '{}'", name)))?;

        let mut spaces = Vec::new();
        match params.vectors_config.and_then(|v| v.config) {
            Some(vectors_config::Config::ParamsMap(map)) => {
                for (space_name, p) in map.map {
                    spaces.push(VectorSpace {
                        name: space_name,
                        config: space_from_params(&p),
                    });
                }
            }
            Some(vectors_config::Config::Params(p)) => spaces.push(VectorSpace {
                name: String::new(),
                config: space_from_params(&p),
            }),
            None => {}
        }
        if let Some(sparse) = params.sparse_vectors_config {
            for (space_name, p) in sparse.map {
                let modifier = if p.modifier == Some(Modifier::Idf as i32) {
                    SparseModifier::Idf
                } else {
                    SparseModifier::None
                };
                spaces.push(VectorSpace {
                    name: space_name,
                    config: SpaceConfig::Sparse { modifier },
                });
            }
        }
        spaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(spaces)
    }

    async fn collection_metadata(&self, name: &str) -> Result<CollectionMetadata> {
        let config = self
            .client
            .collection_info(name)
            .await
            .map_err(storage_error)?
            .result
            .and_then(|info| info.config)
            .ok_or_else(|| storage_error(format!("No config for collection '{}'", name)))?;

        Ok(config
            .metadata
            .into_iter()
            .map(|(k, v)| (k, to_json(v)))
            .collect())
    }

    async fn update_collection_metadata(
        &self,
        name: &str,
        metadata: CollectionMetadata,
    ) -> Result<()> {
        self.client
            .update_collection(UpdateCollectionBuilder::new(name).metadata(to_metadata(metadata)))
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
        wait: bool,
    ) -> Result<()> {
        let mut structs = Vec::with_capacity(points.len());
        for point in points {
            let mut vectors = NamedVectors::default();
            for (name, data) in point.vectors {
                vectors = vectors.add_vector(name, to_vector(data));
            }
            let payload = Payload::try_from(serde_json::Value::Object(point.payload))
                .map_err(|e| storage_error(format!("Invalid payload: {}", e)))?;
            structs.push(PointStruct::new(to_point_id(point.id), vectors, payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, structs).wait(wait))
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn update_index_construction(
        &self,
        collection: &str,
        space: &str,
        hnsw_m: u64,
    ) -> Result<()> {
        let mut map = HashMap::new();
        map.insert(
            space.to_string(),
            VectorParamsDiff {
                hnsw_config: Some(hnsw(hnsw_m)),
                ..Default::default()
            },
        );

        self.client
            .update_collection(UpdateCollectionBuilder::new(collection).vectors_config(
                VectorsConfigDiff {
                    config: Some(vectors_config_diff::Config::ParamsMap(VectorParamsDiffMap {
                        map,
                    })),
                },
            ))
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn create_field_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldIndexKind,
    ) -> Result<()> {
        let field_type = match kind {
            FieldIndexKind::Keyword => FieldType::Keyword,
        };
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                collection, field, field_type,
            ))
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredPoint>> {
        let builder = query_points(&request);
        let response = self.client.query(builder).await.map_err(storage_error)?;

        response
            .result
            .into_iter()
            .map(|point| {
                Ok(ScoredPoint {
                    id: from_point_id(point.id)?,
                    score: point.score,
                    payload: point
                        .payload
                        .into_iter()
                        .map(|(k, v)| (k, to_json(v)))
                        .collect(),
                })
            })
            .collect()
    }

    async fn health(&self) -> Result<()> {
        self.client.health_check().await.map_err(storage_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Distance, MultivectorComparator, Prefetch, Quantization};

    #[test]
    fn test_dense_params_roundtrip() {
        let config = SpaceConfig::Dense {
            size: 1024,
            distance: Distance::Cosine,
            quantization: Quantization::Binary,
            always_ram: true,
            on_disk: true,
            hnsw_m: 0,
        };
        let params = vector_params(&config).unwrap();
        assert_eq!(params.size, 1024);
        assert_eq!(params.hnsw_config.as_ref().and_then(|h| h.m), Some(0));
        assert_eq!(params.memory, Some(Memory::Cold as i32));
        match params
            .quantization_config
            .as_ref()
            .and_then(|q| q.quantization.as_ref())
        {
            Some(quantization_config::Quantization::Binary(b)) => {
                assert_eq!(b.memory, Some(Memory::Pinned as i32))
            }
            other => panic!("expected binary quantization, got {:?}", other),
        }
        assert_eq!(space_from_params(&params), config);
    }

    #[test]
    fn test_multivector_params() {
        let config = SpaceConfig::Multivector {
            size: 128,
            distance: Distance::Cosine,
            comparator: MultivectorComparator::MaxSim,
            hnsw_m: 0,
        };
        let params = vector_params(&config).unwrap();
        assert!(params.multivector_config.is_some());
        assert_eq!(space_from_params(&params), config);
    }

    #[test]
    fn test_query_selects_payload_without_vectors() {
        let tenant = MatchFilter {
            field: "user_id".to_string(),
            value: "user_0".to_string(),
        };
        let request = QueryRequest {
            collection: "docs".to_string(),
            prefetch: vec![Prefetch {
                using: "dense".to_string(),
                query: VectorData::Dense(vec![0.1, 0.2]),
                limit: 50,
                filter: Some(tenant.clone()),
            }],
            query: VectorData::Multi(vec![vec![0.1, 0.2]]),
            using: "late".to_string(),
            filter: Some(tenant),
            limit: 10,
            payload_fields: vec!["title".to_string(), "text".to_string()],
        };

        let points = query_points(&request).build();
        assert_eq!(points.prefetch.len(), 1);
        assert_eq!(points.using.as_deref(), Some("late"));
        assert_eq!(points.limit, Some(10));
        assert!(points.filter.is_some());
        match points.with_payload.and_then(|p| p.selector_options) {
            Some(SelectorOptions::Include(include)) => {
                assert_eq!(include.fields, vec!["title", "text"])
            }
            other => panic!("unexpected payload selector: {:?}", other),
        }
    }

    #[test]
    fn test_payload_value_conversion() {
        let value = qdrant_client::qdrant::Value {
            kind: Some(Kind::StringValue("user_3".to_string())),
        };
        assert_eq!(to_json(value), serde_json::json!("user_3"));
    }

    #[tokio::test]
    #[ignore] // Requires a running Qdrant on localhost:6334
    async fn test_health_against_local_qdrant() {
        let store =
            QdrantStore::connect("http://localhost:6334", None, Duration::from_secs(5)).unwrap();
        assert!(store.health().await.is_ok());
    }
}
