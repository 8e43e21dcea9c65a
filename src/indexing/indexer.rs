/// Batch indexer for bulk offline loads
use super::corpus::{parse_document_id, CorpusItem};
use super::partition::TenantPartition;
use crate::config::IndexingConfig;
use crate::embedding::{EmbeddingGateway, PassageEmbeddings};
use crate::error::{Result, TrilaneError};
use crate::schema::{CollectionSchema, SchemaManager};
use crate::store::{PointId, PointRecord, VectorData, VectorStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Lifecycle of one bulk load. Transitions are strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    NotStarted,
    SchemaEnsured,
    Loading,
    Finalizing,
    Ready,
}

impl fmt::Display for IndexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexerState::NotStarted => "not_started",
            IndexerState::SchemaEnsured => "schema_ensured",
            IndexerState::Loading => "loading",
            IndexerState::Finalizing => "finalizing",
            IndexerState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Summary of a completed load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub documents: usize,
    pub batches: usize,
    pub tenants: usize,
    pub duration_ms: u64,
}

type JoinResult = std::result::Result<Result<(usize, usize)>, tokio::task::JoinError>;

/// A corpus item with its id and tenant resolved
#[derive(Debug, Clone)]
struct PreparedDoc {
    id: u64,
    tenant: String,
    item: CorpusItem,
}

/// Everything a batch worker needs, shareable across tasks
#[derive(Clone)]
struct BatchContext {
    store: Arc<dyn VectorStore>,
    gateway: EmbeddingGateway,
    schema: Arc<CollectionSchema>,
    upsert_wait: bool,
}

/// Batch Indexer
///
/// Drives `NotStarted → SchemaEnsured → Loading → Finalizing → Ready`.
/// Any failure aborts the run; there is no checkpoint or resume.
pub struct BatchIndexer {
    schema: Arc<SchemaManager>,
    store: Arc<dyn VectorStore>,
    gateway: EmbeddingGateway,
    config: IndexingConfig,
    state: IndexerState,
    history: Vec<IndexerState>,
}

impl BatchIndexer {
    pub fn new(
        schema: Arc<SchemaManager>,
        store: Arc<dyn VectorStore>,
        gateway: EmbeddingGateway,
        config: IndexingConfig,
    ) -> Self {
        Self {
            schema,
            store,
            gateway,
            config,
            state: IndexerState::NotStarted,
            history: vec![IndexerState::NotStarted],
        }
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[IndexerState] {
        &self.history
    }

    fn transition(&mut self, to: IndexerState) {
        info!(
            from = %self.state,
            to = %to,
            collection = self.schema.schema().name(),
            "Indexer state transition"
        );
        self.state = to;
        self.history.push(to);
    }

    /// Run the full bulk load over `corpus`
    pub async fn run(&mut self, corpus: Vec<CorpusItem>) -> Result<IndexReport> {
        if self.state != IndexerState::NotStarted {
            return Err(TrilaneError::Other(anyhow::anyhow!(
                "Indexer already ran (state: {})",
                self.state
            )));
        }
        let start = Instant::now();

        self.schema.ensure_collection().await?;
        self.transition(IndexerState::SchemaEnsured);

        self.transition(IndexerState::Loading);
        let partition = TenantPartition::new(corpus.len(), self.config.num_tenants)?;
        let documents = self.prepare(corpus, &partition)?;
        let batches = self.load(documents).await?;

        self.transition(IndexerState::Finalizing);
        self.schema.ensure_payload_index().await?;
        self.schema.finalize_index().await?;

        self.transition(IndexerState::Ready);

        let report = IndexReport {
            documents: partition.total(),
            batches,
            tenants: partition.populated_tenants(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Indexing complete: {} documents, {} batches, {} tenants, {}ms",
            report.documents, report.batches, report.tenants, report.duration_ms
        );
        Ok(report)
    }

    /// Resolve ids and tenants up front so a bad key aborts before any upsert
    fn prepare(
        &self,
        corpus: Vec<CorpusItem>,
        partition: &TenantPartition,
    ) -> Result<Vec<PreparedDoc>> {
        corpus
            .into_iter()
            .enumerate()
            .map(|(ordinal, item)| {
                let id = parse_document_id(&item.key, &self.config.id_prefix)?;
                Ok(PreparedDoc {
                    id,
                    tenant: partition.tenant_id(ordinal),
                    item,
                })
            })
            .collect()
    }

    /// Embed and upsert every batch; returns once all of them have landed
    async fn load(&self, documents: Vec<PreparedDoc>) -> Result<usize> {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = documents.len().div_ceil(batch_size);
        info!(
            "Loading {} documents in {} batches of up to {} ({} concurrent)",
            documents.len(),
            total_batches,
            batch_size,
            self.config.max_concurrent_batches
        );

        let context = BatchContext {
            store: Arc::clone(&self.store),
            gateway: self.gateway.clone(),
            schema: Arc::new(self.schema.schema().clone()),
            upsert_wait: self.config.upsert_wait,
        };
        let max_in_flight = self.config.max_concurrent_batches.max(1);
        let mut tasks = JoinSet::new();

        for (index, chunk) in documents.chunks(batch_size).enumerate() {
            // A slot frees only once its result is settled here, so nothing is
            // spawned after a failure has been produced
            if tasks.len() >= max_in_flight {
                if let Some(joined) = tasks.join_next().await {
                    Self::settle_or_abort(&mut tasks, joined, total_batches).await?;
                }
            }
            while let Some(joined) = tasks.try_join_next() {
                Self::settle_or_abort(&mut tasks, joined, total_batches).await?;
            }

            let context = context.clone();
            let chunk = chunk.to_vec();
            tasks.spawn(async move {
                process_batch(&context, chunk)
                    .await
                    .map(|count| (index, count))
            });
        }

        // Hard barrier: every batch completes before finalizing
        while let Some(joined) = tasks.join_next().await {
            Self::settle_or_abort(&mut tasks, joined, total_batches).await?;
        }

        Ok(total_batches)
    }

    /// On failure, cancel and await every in-flight batch before returning,
    /// so no write lands after the error is reported
    async fn settle_or_abort(
        tasks: &mut JoinSet<Result<(usize, usize)>>,
        joined: JoinResult,
        total_batches: usize,
    ) -> Result<()> {
        let settled = Self::settle(joined, total_batches);
        if settled.is_err() {
            tasks.shutdown().await;
        }
        settled
    }

    fn settle(joined: JoinResult, total_batches: usize) -> Result<()> {
        match joined {
            Ok(Ok((index, count))) => {
                debug!("Batch {}/{} upserted ({} points)", index + 1, total_batches, count);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Batch failed, aborting load: {}", e);
                Err(e)
            }
            Err(e) => Err(TrilaneError::Other(anyhow::anyhow!(
                "Batch task failed: {}",
                e
            ))),
        }
    }
}

async fn process_batch(context: &BatchContext, chunk: Vec<PreparedDoc>) -> Result<usize> {
    let texts: Vec<String> = chunk.iter().map(|d| d.item.text.clone()).collect();
    let embeddings = context
        .gateway
        .embed_passages(texts, context.schema.multivector_at_load)
        .await?;

    let count = chunk.len();
    let points: Vec<PointRecord> = chunk
        .into_iter()
        .zip(embeddings)
        .map(|(doc, embedding)| build_point(&context.schema, doc, embedding))
        .collect();

    context
        .store
        .upsert_points(context.schema.name(), points, context.upsert_wait)
        .await?;
    Ok(count)
}

fn build_point(schema: &CollectionSchema, doc: PreparedDoc, embedding: PassageEmbeddings) -> PointRecord {
    let mut vectors = vec![
        (schema.dense_space.clone(), VectorData::Dense(embedding.dense)),
        (schema.sparse_space.clone(), VectorData::Sparse(embedding.sparse)),
    ];
    if let Some(multivector) = embedding.multivector {
        vectors.push((schema.multivector_space.clone(), VectorData::Multi(multivector)));
    }

    let mut payload = Map::new();
    payload.insert(schema.tenant_field.clone(), Value::String(doc.tenant));
    payload.insert("title".to_string(), Value::String(doc.item.title));
    payload.insert("text".to_string(), Value::String(doc.item.text));
    payload.insert("doc_key".to_string(), Value::String(doc.item.key));

    PointRecord {
        id: PointId::Num(doc.id),
        vectors,
        payload,
    }
}
