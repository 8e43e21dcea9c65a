//! Process-wide collaborators, constructed once and passed down explicitly.

use crate::config::{Config, StorageBackend};
use crate::embedding::EmbeddingGateway;
use crate::error::Result;
use crate::indexing::BatchIndexer;
use crate::retrieval::HybridSearcher;
use crate::schema::{CollectionSchema, SchemaManager};
use crate::store::{MemoryStore, QdrantStore, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared storage client, embedding models and schema manager.
///
/// The owning process controls their lifetime; dropping the last clone
/// releases the storage connection and the models.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn VectorStore>,
    pub gateway: EmbeddingGateway,
    pub schema: Arc<SchemaManager>,
}

impl AppContext {
    pub fn new(config: Config, store: Arc<dyn VectorStore>, gateway: EmbeddingGateway) -> Self {
        let schema = Arc::new(SchemaManager::new(
            Arc::clone(&store),
            CollectionSchema::from_config(&config.collection),
        ));
        Self {
            config: Arc::new(config),
            store,
            gateway,
            schema,
        }
    }

    /// Connect to storage and load every embedding model
    pub fn from_config(config: Config) -> Result<Self> {
        let store = connect_store(&config)?;
        let gateway = EmbeddingGateway::from_config(&config.embedding, &config.collection)?;
        let (dense, sparse, late) = gateway.model_names();
        info!(
            "Embedding models ready: dense={} sparse={} late_interaction={}",
            dense, sparse, late
        );
        Ok(Self::new(config, store, gateway))
    }

    pub fn searcher(&self) -> HybridSearcher {
        HybridSearcher::new(
            Arc::clone(&self.store),
            self.gateway.clone(),
            Arc::clone(&self.schema),
            self.config.collection.payload_fields.clone(),
            self.config.search.clone(),
        )
    }

    pub fn indexer(&self) -> BatchIndexer {
        BatchIndexer::new(
            Arc::clone(&self.schema),
            Arc::clone(&self.store),
            self.gateway.clone(),
            self.config.indexing.clone(),
        )
    }
}

/// Storage client for the configured backend, without loading any model
pub fn connect_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.storage.backend {
        StorageBackend::Qdrant => Arc::new(QdrantStore::connect(
            &config.storage.url,
            config.storage_api_key(),
            Duration::from_secs(config.storage.timeout_secs),
        )?),
        StorageBackend::Memory => {
            info!("Using in-process memory store; data is not persisted");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}
