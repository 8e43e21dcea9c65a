mod common;

use common::{synthetic_texts, test_config, Harness, TEXTS};
use trilane::context::AppContext;
use trilane::error::TrilaneError;
use trilane::retrieval::SearchQuery;
use trilane::store::PointId;

const TOLKIEN_QUERY: &str = "lord rings hobbits tolkien";

#[tokio::test]
async fn test_best_match_ranked_first_within_tenant() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;
    let searcher = harness.context.searcher();

    let result = searcher
        .search(
            &SearchQuery::new(TOLKIEN_QUERY)
                .for_tenant("user_0")
                .with_limits(50, 10),
        )
        .await
        .unwrap();

    assert!(!result.is_empty());
    assert_eq!(result.results[0].id, PointId::Num(3));
    assert!(result
        .results
        .iter()
        .all(|hit| hit.payload["user_id"] == "user_0"));
}

#[tokio::test]
async fn test_other_tenant_never_sees_document() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;
    let searcher = harness.context.searcher();

    let result = searcher
        .search(
            &SearchQuery::new(TOLKIEN_QUERY)
                .for_tenant("user_1")
                .with_limits(50, 10),
        )
        .await
        .unwrap();

    assert!(result.results.iter().all(|hit| hit.id != PointId::Num(3)));
    // The other Tolkien document belongs to user_1
    assert_eq!(result.results[0].id, PointId::Num(5));
}

#[tokio::test]
async fn test_unfiltered_search_crosses_tenants() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;

    let result = harness
        .context
        .searcher()
        .search(&SearchQuery::new(TOLKIEN_QUERY))
        .await
        .unwrap();

    let ids: Vec<&PointId> = result.results.iter().take(2).map(|hit| &hit.id).collect();
    assert_eq!(ids, vec![&PointId::Num(3), &PointId::Num(5)]);
}

#[tokio::test]
async fn test_filter_correctness_across_ten_tenants() {
    let texts = synthetic_texts(50);
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
    let harness = Harness::indexed(test_config(10), &texts).await;

    let result = harness
        .context
        .searcher()
        .search(&SearchQuery::new("energy region3").for_tenant("user_5"))
        .await
        .unwrap();

    assert!(!result.is_empty());
    for hit in &result.results {
        assert_eq!(hit.payload["user_id"], "user_5");
    }
}

#[tokio::test]
async fn test_scores_ordered_and_limited() {
    let texts = synthetic_texts(50);
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
    let harness = Harness::indexed(test_config(10), &texts).await;

    let result = harness
        .context
        .searcher()
        .search(&SearchQuery::new("energy topic7 region0").with_limits(20, 4))
        .await
        .unwrap();

    assert!(result.len() <= 4);
    assert!(!result.is_empty());
    for pair in result.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_payload_excludes_vectors_and_unselected_fields() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;

    let result = harness
        .context
        .searcher()
        .search(&SearchQuery::new(TOLKIEN_QUERY))
        .await
        .unwrap();

    let mut keys: Vec<&String> = result.results[0].payload.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["text", "title", "user_id"]);
}

#[tokio::test]
async fn test_unknown_tenant_yields_empty_result() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;

    let result = harness
        .context
        .searcher()
        .search(&SearchQuery::new(TOLKIEN_QUERY).for_tenant("user_42"))
        .await
        .unwrap();

    assert!(result.is_empty());
}

#[tokio::test]
async fn test_empty_query_rejected_before_any_call() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;
    let calls = harness.providers.total_calls();
    harness.store.set_offline(true);

    for text in ["", "   "] {
        let result = harness
            .context
            .searcher()
            .search(&SearchQuery::new(text))
            .await;
        assert!(matches!(result, Err(TrilaneError::InvalidQuery(_))));
    }
    assert_eq!(harness.providers.total_calls(), calls);
}

#[tokio::test]
async fn test_missing_late_interaction_fails_search() {
    let config = test_config(2);
    // Load with working providers, then query through a broken late-interaction one
    let loaded = Harness::indexed(config.clone(), &TEXTS).await;

    let broken = Harness::new(config, &TEXTS, true);
    let searcher = trilane::retrieval::HybridSearcher::new(
        loaded.store.clone(),
        broken.providers.gateway(),
        loaded.context.schema.clone(),
        loaded.context.config.collection.payload_fields.clone(),
        loaded.context.config.search.clone(),
    );

    let result = searcher.search(&SearchQuery::new(TOLKIEN_QUERY)).await;
    assert!(matches!(result, Err(TrilaneError::EmbeddingFailed(_))));
}

#[tokio::test]
async fn test_storage_outage_surfaces_as_unavailable() {
    let harness = Harness::indexed(test_config(2), &TEXTS).await;
    harness.store.set_offline(true);

    let err = harness
        .context
        .searcher()
        .search(&SearchQuery::new(TOLKIEN_QUERY))
        .await
        .unwrap_err();

    assert!(matches!(err, TrilaneError::StorageUnavailable(_)));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_rerank_capability_follows_collection_not_config() {
    let mut load_config = test_config(2);
    load_config.collection.multivector_at_load = false;
    let loaded = Harness::indexed(load_config, &TEXTS).await;

    // A later process with multivectors enabled in its own settings
    let serving = AppContext::new(
        test_config(2),
        loaded.store.clone(),
        loaded.providers.gateway(),
    );
    let calls = loaded.providers.total_calls();

    let result = serving
        .searcher()
        .search(&SearchQuery::new(TOLKIEN_QUERY))
        .await;

    assert!(matches!(
        result,
        Err(TrilaneError::MultivectorUnavailable { .. })
    ));
    assert_eq!(loaded.providers.total_calls(), calls);
}
