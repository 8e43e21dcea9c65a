//! Prefetch + late-interaction rerank search

use super::{SearchHit, SearchQuery, SearchResult};
use crate::config::SearchConfig;
use crate::embedding::{EmbedRole, EmbeddingGateway};
use crate::error::{Result, TrilaneError};
use crate::schema::{CollectionSchema, SchemaManager};
use crate::store::{Prefetch, QueryRequest, VectorData, VectorStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Hybrid searcher over one collection.
///
/// Stateless per request; clones share the store client and the models.
#[derive(Clone)]
pub struct HybridSearcher {
    store: Arc<dyn VectorStore>,
    gateway: EmbeddingGateway,
    schema: Arc<SchemaManager>,
    payload_fields: Vec<String>,
    config: SearchConfig,
}

impl HybridSearcher {
    pub fn new(
        store: Arc<dyn VectorStore>,
        gateway: EmbeddingGateway,
        schema: Arc<SchemaManager>,
        payload_fields: Vec<String>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            schema,
            payload_fields,
            config,
        }
    }

    fn layout(&self) -> &CollectionSchema {
        self.schema.schema()
    }

    pub fn collection(&self) -> &str {
        self.layout().name()
    }

    /// Perform hybrid search
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        if query.text.trim().is_empty() {
            return Err(TrilaneError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        let prefetch_limit = query.prefetch_limit.unwrap_or(self.config.prefetch_limit);
        let final_limit = query.final_limit.unwrap_or(self.config.rerank_limit);
        if prefetch_limit == 0 || final_limit == 0 {
            return Err(TrilaneError::InvalidQuery(
                "Limits must be greater than 0".to_string(),
            ));
        }
        let layout = self.layout();
        // Capability recorded on the collection, not this process's settings
        if !self.schema.multivectors_available().await? {
            return Err(TrilaneError::MultivectorUnavailable {
                space: layout.multivector_space.clone(),
            });
        }

        let start = Instant::now();
        let embeddings = self.gateway.embed(&query.text, EmbedRole::Query).await?;

        let filter = query.tenant.resolve(&layout.tenant_field);
        debug!(
            "Prefetching {} candidates per space, filter: {:?}",
            prefetch_limit, filter
        );

        let request = QueryRequest {
            collection: layout.name().to_string(),
            prefetch: vec![
                Prefetch {
                    using: layout.dense_space.clone(),
                    query: VectorData::Dense(embeddings.dense),
                    limit: prefetch_limit,
                    filter: filter.clone(),
                },
                Prefetch {
                    using: layout.sparse_space.clone(),
                    query: VectorData::Sparse(embeddings.sparse),
                    limit: prefetch_limit,
                    filter: filter.clone(),
                },
            ],
            query: VectorData::Multi(embeddings.multivector),
            using: layout.multivector_space.clone(),
            filter,
            limit: final_limit,
            payload_fields: self.payload_fields.clone(),
        };

        let points = self.store.query(request).await?;
        let result = SearchResult {
            results: points.into_iter().map(SearchHit::from).collect(),
        };

        info!(
            tenant = ?query.tenant,
            results = result.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );
        Ok(result)
    }
}
