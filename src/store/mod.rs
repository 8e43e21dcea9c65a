//! Storage engine boundary
//!
//! The vector-storage engine is an external collaborator. Everything the rest
//! of the crate needs from it is expressed by the [`VectorStore`] trait:
//! collection lifecycle, point upserts, index-construction toggles, keyword
//! field indexes, and the prefetch + rerank query.
//!
//! Two bindings exist:
//! - [`QdrantStore`]: the production engine, over gRPC
//! - [`MemoryStore`]: an exact, in-process engine for dry runs and tests

mod memory;
mod qdrant;

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Similarity metric of a dense or multivector space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Cosine,
}

/// Dense vector quantization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    None,
    Binary,
}

/// Scoring modifier for sparse spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseModifier {
    None,
    Idf,
}

/// How per-token similarities are aggregated in a multivector space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultivectorComparator {
    /// Max similarity per query token, summed over query tokens
    MaxSim,
}

/// Configuration of one named vector space.
///
/// `hnsw_m` is the graph fan-out: 0 means index construction is deferred or
/// disabled, anything above 0 means active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SpaceConfig {
    Dense {
        size: u64,
        distance: Distance,
        quantization: Quantization,
        always_ram: bool,
        on_disk: bool,
        hnsw_m: u64,
    },
    Sparse {
        modifier: SparseModifier,
    },
    Multivector {
        size: u64,
        distance: Distance,
        comparator: MultivectorComparator,
        hnsw_m: u64,
    },
}

impl SpaceConfig {
    pub fn kind(&self) -> SpaceKind {
        match self {
            SpaceConfig::Dense { .. } => SpaceKind::Dense,
            SpaceConfig::Sparse { .. } => SpaceKind::Sparse,
            SpaceConfig::Multivector { .. } => SpaceKind::Multivector,
        }
    }

    /// Fixed per-vector dimensionality, if the space has one
    pub fn size(&self) -> Option<u64> {
        match self {
            SpaceConfig::Dense { size, .. } | SpaceConfig::Multivector { size, .. } => Some(*size),
            SpaceConfig::Sparse { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    Dense,
    Sparse,
    Multivector,
}

impl fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpaceKind::Dense => "dense",
            SpaceKind::Sparse => "sparse",
            SpaceKind::Multivector => "multivector",
        };
        f.write_str(s)
    }
}

/// A named vector space of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSpace {
    pub name: String,
    pub config: SpaceConfig,
}

/// Free-form collection-level key/value metadata
pub type CollectionMetadata = serde_json::Map<String, serde_json::Value>;

/// Everything needed to create a collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub spaces: Vec<VectorSpace>,
    pub shard_number: u32,
    pub replication_factor: u32,
    /// Stored with the collection at creation
    pub metadata: CollectionMetadata,
}

impl CollectionSpec {
    pub fn space(&self, name: &str) -> Option<&VectorSpace> {
        self.spaces.iter().find(|s| s.name == name)
    }
}

/// Secondary payload index kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIndexKind {
    /// Exact-match keyword index
    Keyword,
}

/// Variable-length (index, weight) pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        Self { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A single vector value for one space
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Dense(Vec<f32>),
    Sparse(SparseVector),
    Multi(Vec<Vec<f32>>),
}

/// Point identifier: unsigned integer or UUID string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{}", n),
            PointId::Uuid(u) => f.write_str(u),
        }
    }
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        PointId::Num(id)
    }
}

/// Point as written to the engine
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub id: PointId,
    pub vectors: Vec<(String, VectorData)>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Exact-match condition on a keyword payload field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFilter {
    pub field: String,
    pub value: String,
}

/// First-stage candidate retrieval against one space
#[derive(Debug, Clone)]
pub struct Prefetch {
    pub using: String,
    pub query: VectorData,
    pub limit: u64,
    pub filter: Option<MatchFilter>,
}

/// Fused query: candidates from every prefetch are merged by the engine and
/// rescored with `query` against the `using` space.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub collection: String,
    pub prefetch: Vec<Prefetch>,
    pub query: VectorData,
    pub using: String,
    pub filter: Option<MatchFilter>,
    pub limit: u64,
    pub payload_fields: Vec<String>,
}

/// One ranked result, without vectors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Operations consumed from the vector-storage engine.
///
/// Implementations must be safe for concurrent use; one instance is shared by
/// every request and every indexing worker.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Vector spaces of an existing collection as the engine reports them
    async fn describe_collection(&self, name: &str) -> Result<Vec<VectorSpace>>;

    async fn collection_metadata(&self, name: &str) -> Result<CollectionMetadata>;

    /// Merge `metadata` into what the collection already stores
    async fn update_collection_metadata(&self, name: &str, metadata: CollectionMetadata)
        -> Result<()>;

    async fn upsert_points(&self, collection: &str, points: Vec<PointRecord>, wait: bool)
        -> Result<()>;

    /// Set the index-construction fan-out of one space (0 disables)
    async fn update_index_construction(&self, collection: &str, space: &str, hnsw_m: u64)
        -> Result<()>;

    async fn create_field_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldIndexKind,
    ) -> Result<()>;

    async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredPoint>>;

    /// Cheap liveness probe
    async fn health(&self) -> Result<()>;
}
