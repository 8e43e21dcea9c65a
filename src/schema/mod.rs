//! Collection Schema Manager
//!
//! Provisions the three-space collection and owns its index-construction
//! lifecycle. The dense space is created with graph construction deferred
//! (`hnsw_m = 0`) and switched on exactly once, after bulk load, by
//! [`SchemaManager::finalize_index`]. The multivector space is only ever used
//! for exact rerank, so its construction stays disabled for good.
//!
//! Whether points carry passage multivectors is recorded in the collection
//! metadata, so a process started with different settings still knows if
//! late-interaction rerank is possible.

use crate::config::CollectionConfig;
use crate::error::{Result, TrilaneError};
use crate::store::{
    CollectionMetadata, CollectionSpec, Distance, FieldIndexKind, MultivectorComparator,
    SpaceConfig, SparseModifier, VectorSpace, VectorStore,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Graph fan-out value meaning "do not build"
pub const DEFERRED_HNSW_M: u64 = 0;

/// Collection metadata key holding the multivector capability
pub const MULTIVECTOR_METADATA_KEY: &str = "multivector_at_load";

fn multivector_metadata(available: bool) -> CollectionMetadata {
    let mut metadata = CollectionMetadata::new();
    metadata.insert(MULTIVECTOR_METADATA_KEY.to_string(), Value::Bool(available));
    metadata
}

/// Unrecorded means no guarantee, so it reads as unavailable
fn recorded_multivectors(metadata: &CollectionMetadata) -> bool {
    metadata
        .get(MULTIVECTOR_METADATA_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Expected layout of the collection, derived from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    pub spec: CollectionSpec,
    pub dense_space: String,
    pub sparse_space: String,
    pub multivector_space: String,
    pub tenant_field: String,
    /// Fan-out applied to the dense space on finalize
    pub indexed_hnsw_m: u64,
    /// Whether passage multivectors are written during bulk load
    pub multivector_at_load: bool,
    pub strict: bool,
}

impl CollectionSchema {
    pub fn from_config(config: &CollectionConfig) -> Self {
        let spaces = vec![
            VectorSpace {
                name: config.dense.name.clone(),
                config: SpaceConfig::Dense {
                    size: config.dense.size,
                    distance: Distance::Cosine,
                    quantization: config.dense.quantization,
                    always_ram: config.dense.always_ram,
                    on_disk: config.dense.on_disk,
                    hnsw_m: DEFERRED_HNSW_M,
                },
            },
            VectorSpace {
                name: config.sparse.name.clone(),
                config: SpaceConfig::Sparse {
                    modifier: if config.sparse.idf {
                        SparseModifier::Idf
                    } else {
                        SparseModifier::None
                    },
                },
            },
            VectorSpace {
                name: config.late_interaction.name.clone(),
                config: SpaceConfig::Multivector {
                    size: config.late_interaction.size,
                    distance: Distance::Cosine,
                    comparator: MultivectorComparator::MaxSim,
                    hnsw_m: DEFERRED_HNSW_M,
                },
            },
        ];

        Self {
            spec: CollectionSpec {
                name: config.name.clone(),
                spaces,
                shard_number: config.shard_number,
                replication_factor: config.replication_factor,
                metadata: multivector_metadata(config.multivector_at_load),
            },
            dense_space: config.dense.name.clone(),
            sparse_space: config.sparse.name.clone(),
            multivector_space: config.late_interaction.name.clone(),
            tenant_field: config.tenant_field.clone(),
            indexed_hnsw_m: config.hnsw_m,
            multivector_at_load: config.multivector_at_load,
            strict: config.strict_schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Differences between this schema and what the engine reports.
    ///
    /// Compares everything that affects scoring: kinds, sizes, the sparse
    /// modifier and dense quantization. Graph fan-out and storage placement
    /// are skipped; fan-out legitimately changes after finalize.
    pub fn diff(&self, existing: &[VectorSpace]) -> Vec<String> {
        let mut diffs = Vec::new();
        for expected in &self.spec.spaces {
            let Some(found) = existing.iter().find(|s| s.name == expected.name) else {
                diffs.push(format!("missing vector space '{}'", expected.name));
                continue;
            };
            let name = &expected.name;

            if found.config.kind() != expected.config.kind() {
                diffs.push(format!(
                    "space '{}' is {} but {} is expected",
                    name,
                    found.config.kind(),
                    expected.config.kind()
                ));
                continue;
            }
            if found.config.size() != expected.config.size() {
                diffs.push(format!(
                    "space '{}' has size {:?} but {:?} is expected",
                    name,
                    found.config.size(),
                    expected.config.size()
                ));
            }
            match (&found.config, &expected.config) {
                (
                    SpaceConfig::Sparse { modifier: found },
                    SpaceConfig::Sparse { modifier: wanted },
                ) if found != wanted => diffs.push(format!(
                    "space '{}' uses modifier {:?} but {:?} is expected",
                    name, found, wanted
                )),
                (
                    SpaceConfig::Dense { quantization: found, .. },
                    SpaceConfig::Dense { quantization: wanted, .. },
                ) if found != wanted => diffs.push(format!(
                    "space '{}' uses quantization {:?} but {:?} is expected",
                    name, found, wanted
                )),
                _ => {}
            }
        }
        diffs
    }
}

/// Index-construction lifecycle of the dense space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Building,
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Finalized,
    /// Construction was already active; nothing was sent to the engine
    AlreadyIndexed,
}

/// Collection Schema Manager
pub struct SchemaManager {
    store: Arc<dyn VectorStore>,
    schema: CollectionSchema,
    phase: Mutex<IndexPhase>,
    payload_indexed: Mutex<bool>,
    multivectors: Mutex<Option<bool>>,
}

impl SchemaManager {
    pub fn new(store: Arc<dyn VectorStore>, schema: CollectionSchema) -> Self {
        Self {
            store,
            schema,
            phase: Mutex::new(IndexPhase::Building),
            payload_indexed: Mutex::new(false),
            multivectors: Mutex::new(None),
        }
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub async fn phase(&self) -> IndexPhase {
        *self.phase.lock().await
    }

    /// Create the collection unless it exists. Never overwrites an existing
    /// schema; a mismatching one is a `SchemaConflict` in strict mode and a
    /// warning otherwise.
    pub async fn ensure_collection(&self) -> Result<EnsureOutcome> {
        let name = self.schema.name();

        if self.store.collection_exists(name).await? {
            let existing = self.store.describe_collection(name).await?;
            let diffs = self.schema.diff(&existing);
            if !diffs.is_empty() {
                let details = diffs.join("; ");
                if self.schema.strict {
                    return Err(TrilaneError::SchemaConflict {
                        collection: name.to_string(),
                        details,
                    });
                }
                warn!(
                    collection = name,
                    "Existing collection differs from expected schema, keeping it: {}", details
                );
            }

            let indexed = existing.iter().any(|s| {
                s.name == self.schema.dense_space
                    && matches!(s.config, SpaceConfig::Dense { hnsw_m, .. } if hnsw_m > DEFERRED_HNSW_M)
            });
            *self.phase.lock().await = if indexed {
                IndexPhase::Indexed
            } else {
                IndexPhase::Building
            };
            self.reconcile_multivectors().await?;

            info!(collection = name, "Collection already exists, keeping its schema");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        self.store.create_collection(&self.schema.spec).await?;
        *self.phase.lock().await = IndexPhase::Building;
        *self.multivectors.lock().await = Some(self.schema.multivector_at_load);

        info!(
            collection = name,
            shards = self.schema.spec.shard_number,
            replication = self.schema.spec.replication_factor,
            "Collection created with deferred dense index"
        );
        Ok(EnsureOutcome::Created)
    }

    /// A load without multivectors into a collection recorded as having them
    /// downgrades the record before any point is written. The reverse never
    /// upgrades it: older points would still lack multivectors.
    async fn reconcile_multivectors(&self) -> Result<()> {
        let name = self.schema.name();
        let recorded = recorded_multivectors(&self.store.collection_metadata(name).await?);

        let available = match (recorded, self.schema.multivector_at_load) {
            (true, false) => {
                self.store
                    .update_collection_metadata(name, multivector_metadata(false))
                    .await?;
                warn!(
                    collection = name,
                    "Loading without multivectors, late-interaction rerank disabled"
                );
                false
            }
            (false, true) => {
                warn!(
                    collection = name,
                    "Collection has points without multivectors, rerank stays unavailable"
                );
                false
            }
            (recorded, _) => recorded,
        };
        *self.multivectors.lock().await = Some(available);
        Ok(())
    }

    /// Whether stored points carry passage multivectors, as recorded on the
    /// collection. Read from the engine once, then cached.
    pub async fn multivectors_available(&self) -> Result<bool> {
        let mut cached = self.multivectors.lock().await;
        if let Some(available) = *cached {
            return Ok(available);
        }
        let metadata = self.store.collection_metadata(self.schema.name()).await?;
        let available = recorded_multivectors(&metadata);
        *cached = Some(available);
        Ok(available)
    }

    /// Keyword index on the tenant field
    pub async fn ensure_payload_index(&self) -> Result<()> {
        let mut done = self.payload_indexed.lock().await;
        if *done {
            return Ok(());
        }

        self.store
            .create_field_index(
                self.schema.name(),
                &self.schema.tenant_field,
                FieldIndexKind::Keyword,
            )
            .await?;
        *done = true;

        info!(
            collection = self.schema.name(),
            field = %self.schema.tenant_field,
            "Payload index ready"
        );
        Ok(())
    }

    /// Re-enable graph construction on the dense space.
    ///
    /// Callers must only invoke this after every batch of the bulk load has
    /// been upserted. Building → Indexed happens once; later calls are no-ops.
    pub async fn finalize_index(&self) -> Result<FinalizeOutcome> {
        let mut phase = self.phase.lock().await;
        if *phase == IndexPhase::Indexed {
            warn!(
                collection = self.schema.name(),
                "Dense index already finalized, ignoring"
            );
            return Ok(FinalizeOutcome::AlreadyIndexed);
        }

        self.store
            .update_index_construction(
                self.schema.name(),
                &self.schema.dense_space,
                self.schema.indexed_hnsw_m,
            )
            .await?;
        *phase = IndexPhase::Indexed;

        info!(
            collection = self.schema.name(),
            space = %self.schema.dense_space,
            m = self.schema.indexed_hnsw_m,
            "Dense index construction enabled"
        );
        Ok(FinalizeOutcome::Finalized)
    }
}
