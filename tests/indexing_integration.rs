mod common;

use async_trait::async_trait;
use common::{corpus, test_config, Harness, Providers, Vocabulary, TEXTS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trilane::context::AppContext;
use trilane::error::{Result, TrilaneError};
use trilane::indexing::{CorpusItem, IndexerState};
use trilane::retrieval::SearchQuery;
use trilane::schema::{FinalizeOutcome, IndexPhase};
use trilane::store::{
    CollectionMetadata, CollectionSpec, FieldIndexKind, MemoryStore, PointId, PointRecord,
    QueryRequest, ScoredPoint, VectorSpace, VectorStore,
};

#[tokio::test]
async fn test_state_sequence_and_report() {
    let harness = Harness::new(test_config(2), &TEXTS, false);
    let mut indexer = harness.context.indexer();
    assert_eq!(indexer.state(), IndexerState::NotStarted);

    let report = indexer.run(corpus(&TEXTS)).await.unwrap();

    assert_eq!(
        indexer.history(),
        &[
            IndexerState::NotStarted,
            IndexerState::SchemaEnsured,
            IndexerState::Loading,
            IndexerState::Finalizing,
            IndexerState::Ready,
        ]
    );
    assert_eq!(report.documents, 10);
    assert_eq!(report.batches, 2);
    assert_eq!(report.tenants, 2);
    assert_eq!(harness.store.point_count("test_corpus").await, 10);

    // A finished indexer does not run again
    assert!(indexer.run(corpus(&TEXTS)).await.is_err());
}

#[tokio::test]
async fn test_tenant_assignment_in_payload() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;

    for id in 0..10u64 {
        let payload = harness
            .store
            .payload("test_corpus", &PointId::Num(id))
            .await
            .unwrap();
        let expected = if id < 5 { "user_0" } else { "user_1" };
        assert_eq!(payload["user_id"], expected);
        assert_eq!(payload["doc_key"], format!("doc{}", id));
        assert_eq!(payload["title"], format!("Document {}", id));
    }
}

#[tokio::test]
async fn test_tenant_assignment_ignores_batch_concurrency() {
    let texts = common::synthetic_texts(37);
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();

    let mut sequential = test_config(10);
    sequential.indexing.batch_size = 3;
    let mut concurrent = sequential.clone();
    concurrent.indexing.max_concurrent_batches = 4;

    let a = Harness::indexed(sequential, &texts).await;
    let b = Harness::indexed(concurrent, &texts).await;

    for id in 0..37u64 {
        let id = PointId::Num(id);
        let left = a.store.payload("test_corpus", &id).await.unwrap();
        let right = b.store.payload("test_corpus", &id).await.unwrap();
        assert_eq!(left["user_id"], right["user_id"]);
    }
}

#[tokio::test]
async fn test_dense_index_finalized_once() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;
    let schema = harness.context.schema.schema();

    assert_eq!(harness.context.schema.phase().await, IndexPhase::Indexed);
    assert_eq!(
        harness
            .store
            .index_construction("test_corpus", &schema.dense_space)
            .await,
        Some(16)
    );
    assert_eq!(
        harness
            .store
            .index_construction("test_corpus", &schema.multivector_space)
            .await,
        Some(0)
    );
    assert!(harness.store.has_field_index("test_corpus", "user_id").await);

    let before = harness.store.mutation_count();
    assert_eq!(
        harness.context.schema.finalize_index().await.unwrap(),
        FinalizeOutcome::AlreadyIndexed
    );
    assert_eq!(harness.store.mutation_count(), before);
}

#[tokio::test]
async fn test_reindex_keeps_existing_collection() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;
    let before = harness.store.mutation_count();

    // Second load into the same collection: schema untouched, finalize skipped
    let report = harness
        .context
        .indexer()
        .run(corpus(&TEXTS))
        .await
        .unwrap();

    assert_eq!(report.documents, 10);
    // Only the two batch upserts mutate the engine
    assert_eq!(harness.store.mutation_count(), before + 2);
    assert_eq!(harness.store.point_count("test_corpus").await, 10);
}

#[tokio::test]
async fn test_bad_document_id_aborts_before_upsert() {
    let harness = Harness::new(test_config(2), &TEXTS, false);
    let mut items = corpus(&TEXTS);
    items[7] = CorpusItem {
        key: "docSEVEN".to_string(),
        title: String::new(),
        text: "broken".to_string(),
    };

    let mut indexer = harness.context.indexer();
    let result = indexer.run(items).await;

    assert!(matches!(result, Err(TrilaneError::Parse { .. })));
    assert_eq!(indexer.state(), IndexerState::Loading);
    assert_eq!(harness.store.point_count("test_corpus").await, 0);
    assert_eq!(harness.context.schema.phase().await, IndexPhase::Building);
}

#[tokio::test]
async fn test_late_interaction_failure_aborts_load() {
    let harness = Harness::new(test_config(2), &TEXTS, true);
    let mut indexer = harness.context.indexer();

    let result = indexer.run(corpus(&TEXTS)).await;

    assert!(matches!(result, Err(TrilaneError::EmbeddingFailed(_))));
    assert_ne!(indexer.state(), IndexerState::Ready);
    assert_eq!(harness.context.schema.phase().await, IndexPhase::Building);
}

#[tokio::test]
async fn test_without_multivectors_search_refuses_rerank() {
    let mut config = test_config(2);
    config.collection.multivector_at_load = false;
    let harness = Harness::indexed(config, &TEXTS).await;
    let calls_after_load = harness.providers.late.calls.load(Ordering::SeqCst);
    assert_eq!(calls_after_load, 0);

    let result = harness
        .context
        .searcher()
        .search(&SearchQuery::new("lord rings"))
        .await;
    assert!(matches!(
        result,
        Err(TrilaneError::MultivectorUnavailable { .. })
    ));
}

/// Memory store whose next upsert fails; later ones succeed
struct FailingUpserts {
    inner: MemoryStore,
    fail_next: AtomicBool,
}

impl FailingUpserts {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_next: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl VectorStore for FailingUpserts {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.inner.collection_exists(name).await
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        self.inner.create_collection(spec).await
    }

    async fn describe_collection(&self, name: &str) -> Result<Vec<VectorSpace>> {
        self.inner.describe_collection(name).await
    }

    async fn collection_metadata(&self, name: &str) -> Result<CollectionMetadata> {
        self.inner.collection_metadata(name).await
    }

    async fn update_collection_metadata(
        &self,
        name: &str,
        metadata: CollectionMetadata,
    ) -> Result<()> {
        self.inner.update_collection_metadata(name, metadata).await
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
        wait: bool,
    ) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TrilaneError::StorageUnavailable(
                "connection reset".to_string(),
            ));
        }
        self.inner.upsert_points(collection, points, wait).await
    }

    async fn update_index_construction(
        &self,
        collection: &str,
        space: &str,
        hnsw_m: u64,
    ) -> Result<()> {
        self.inner
            .update_index_construction(collection, space, hnsw_m)
            .await
    }

    async fn create_field_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldIndexKind,
    ) -> Result<()> {
        self.inner.create_field_index(collection, field, kind).await
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<ScoredPoint>> {
        self.inner.query(request).await
    }

    async fn health(&self) -> Result<()> {
        self.inner.health().await
    }
}

#[tokio::test]
async fn test_upsert_failure_is_fatal() {
    let store = Arc::new(FailingUpserts::new());
    let vocab = Arc::new(Vocabulary::from_texts(TEXTS.iter().copied()));
    let providers = Providers::new(vocab, false);
    let context = AppContext::new(test_config(2), store.clone(), providers.gateway());

    let mut indexer = context.indexer();
    let result = indexer.run(corpus(&TEXTS)).await;

    assert!(matches!(result, Err(TrilaneError::StorageUnavailable(_))));
    assert_eq!(indexer.state(), IndexerState::Loading);
    assert_eq!(context.schema.phase().await, IndexPhase::Building);
    assert!(!store.inner.has_field_index("test_corpus", "user_id").await);
}

/// Point counts right after the failed run returns and a moment later
async fn run_against_failing_store(
    vocab: &Arc<Vocabulary>,
    max_concurrent: usize,
) -> (usize, usize) {
    let store = Arc::new(FailingUpserts::new());
    let providers = Providers::new(Arc::clone(vocab), false);
    let mut config = test_config(2);
    config.indexing.batch_size = 1;
    config.indexing.max_concurrent_batches = max_concurrent;
    let context = AppContext::new(config, store.clone(), providers.gateway());

    let result = context.indexer().run(corpus(&TEXTS)).await;
    assert!(matches!(result, Err(TrilaneError::StorageUnavailable(_))));

    let at_return = store.inner.point_count("test_corpus").await;
    tokio::time::sleep(Duration::from_millis(2)).await;
    (at_return, store.inner.point_count("test_corpus").await)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_batch_written_after_fatal_failure() {
    let vocab = Arc::new(Vocabulary::from_texts(TEXTS.iter().copied()));

    for _ in 0..50 {
        // Sequential batches: nothing after the failed first batch
        assert_eq!(run_against_failing_store(&vocab, 1).await, (0, 0));

        // Concurrent batches: in-flight work is settled before the error returns
        let (at_return, later) = run_against_failing_store(&vocab, 4).await;
        assert_eq!(at_return, later);
    }
}
