//! End-to-end tests for the pull sync engine and sync-state bookkeeping.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{test_store, FakeEmbedder, FakeUpstream};
use context_mirror::embedding::Embedder;
use context_mirror::models::SyncStatus;
use context_mirror::sync::{pull_collection, SyncOrchestrator};
use context_mirror::upstream::{ProviderRegistry, UpstreamClient};

#[tokio::test]
async fn first_sync_mirrors_everything() {
    let (_dir, store) = test_store().await;
    let upstream = FakeUpstream::new(vec![
        FakeUpstream::doc("d1", "First", "body one", 100),
        FakeUpstream::doc("d2", "Second", "body two", 90),
        FakeUpstream::doc("d3", "Third", "body three", 80),
    ]);
    let embedder = FakeEmbedder::new();

    let stats = pull_collection(&store, &upstream, &embedder, "col-1", None)
        .await
        .unwrap();

    assert_eq!(stats.created, 3);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.newest_seen, Some(100));

    let item = store.find_by_upstream("outline", "d2").await.unwrap().unwrap();
    assert_eq!(item.title, "Second");
    assert_eq!(item.body, "body two");
    assert_eq!(item.collection_id.as_deref(), Some("col-1"));
    assert_eq!(item.upstream_updated_at, Some(90));

    let (creates, updates) = store.sync_log_counts("col-1").await.unwrap();
    assert_eq!((creates, updates), (3, 0));

    // Nothing left to embed
    assert!(store.content_missing_vectors().await.unwrap().is_empty());
}

#[tokio::test]
async fn resync_with_cursor_stops_at_first_old_document() {
    let (_dir, store) = test_store().await;
    let upstream = FakeUpstream::new(vec![
        FakeUpstream::doc("d1", "A", "a", 10),
        FakeUpstream::doc("d2", "B", "b", 9),
        FakeUpstream::doc("d3", "C", "c", 8),
        FakeUpstream::doc("d4", "D", "d", 5),
        FakeUpstream::doc("d5", "E", "e", 3),
    ]);
    let embedder = FakeEmbedder::new();

    let stats = pull_collection(&store, &upstream, &embedder, "col-1", Some(8))
        .await
        .unwrap();

    // Only the two documents newer than the cursor get a full fetch.
    assert_eq!(stats.created, 2);
    assert_eq!(upstream.get_call_count(), 2);
    assert!(store.find_by_upstream("outline", "d1").await.unwrap().is_some());
    assert!(store.find_by_upstream("outline", "d3").await.unwrap().is_none());
    assert_eq!(stats.newest_seen, Some(10));
}

#[tokio::test]
async fn second_sync_is_idempotent() {
    let (_dir, store) = test_store().await;
    let upstream = FakeUpstream::new(vec![
        FakeUpstream::doc("d1", "First", "body one", 100),
        FakeUpstream::doc("d2", "Second", "body two", 90),
    ]);
    let embedder = FakeEmbedder::new();

    let first = pull_collection(&store, &upstream, &embedder, "col-1", None)
        .await
        .unwrap();
    assert_eq!(first.created, 2);

    // Cursor = newest seen; everything upstream is now old.
    let second = pull_collection(&store, &upstream, &embedder, "col-1", first.newest_seen)
        .await
        .unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);

    assert_eq!(store.content_count().await.unwrap(), 2);
}

#[tokio::test]
async fn newer_remote_document_updates_in_place() {
    let (_dir, store) = test_store().await;
    let upstream = FakeUpstream::new(vec![FakeUpstream::doc("d1", "Title", "old body", 50)]);
    let embedder = FakeEmbedder::new();

    pull_collection(&store, &upstream, &embedder, "col-1", None)
        .await
        .unwrap();
    let before = store.find_by_upstream("outline", "d1").await.unwrap().unwrap();

    // Remote edit: same id, newer timestamp.
    let upstream = FakeUpstream::new(vec![FakeUpstream::doc("d1", "Title v2", "new body", 60)]);
    let stats = pull_collection(&store, &upstream, &embedder, "col-1", Some(50))
        .await
        .unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.created, 0);

    let after = store.find_by_upstream("outline", "d1").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.title, "Title v2");
    assert_eq!(after.body, "new body");
    assert_eq!(after.upstream_updated_at, Some(60));

    let (creates, updates) = store.sync_log_counts("col-1").await.unwrap();
    assert_eq!((creates, updates), (1, 1));
}

#[tokio::test]
async fn embedding_failure_is_isolated_and_backfillable() {
    let (_dir, store) = test_store().await;
    let upstream = FakeUpstream::new(vec![FakeUpstream::doc("d1", "Doc", "text", 10)]);
    let broken = FakeEmbedder::failing();

    let stats = pull_collection(&store, &upstream, &broken, "col-1", None)
        .await
        .unwrap();
    assert_eq!(stats.errors, 1);

    // Content row survives the embedding failure.
    let item = store.find_by_upstream("outline", "d1").await.unwrap().unwrap();
    assert_eq!(item.body, "text");
    assert_eq!(store.content_missing_vectors().await.unwrap().len(), 1);

    // A later reindex with a healthy embedder fills the gap.
    let healthy = FakeEmbedder::new();
    let reindex_stats = context_mirror::reindex::reindex(&store, &healthy).await.unwrap();
    assert_eq!(reindex_stats.embedded, 1);
    assert!(store.content_missing_vectors().await.unwrap().is_empty());

    // The failed document produced an error log entry.
    let history = store.sync_history(10).await.unwrap();
    assert!(history.iter().any(|e| e.operation == "error"));
}

#[tokio::test]
async fn claim_is_exclusive_until_finished() {
    let (_dir, store) = test_store().await;

    assert!(store.claim_collection("col-1").await.unwrap());
    // Second claim while syncing is refused.
    assert!(!store.claim_collection("col-1").await.unwrap());
    // Other collections are unaffected.
    assert!(store.claim_collection("col-2").await.unwrap());

    store.finish_collection("col-1", Some(42), None).await.unwrap();
    let state = store.sync_state("col-1").await.unwrap().unwrap();
    assert_eq!(state.status.as_str(), "idle");
    assert_eq!(state.last_pull_at, Some(42));

    assert!(store.claim_collection("col-1").await.unwrap());
}

#[tokio::test]
async fn failed_cycle_keeps_cursor_and_records_error() {
    let (_dir, store) = test_store().await;

    store.claim_collection("col-1").await.unwrap();
    store.finish_collection("col-1", Some(42), None).await.unwrap();

    store.claim_collection("col-1").await.unwrap();
    store
        .finish_collection("col-1", None, Some("provider unreachable"))
        .await
        .unwrap();

    let state = store.sync_state("col-1").await.unwrap().unwrap();
    assert_eq!(state.status.as_str(), "error");
    assert_eq!(state.error_message.as_deref(), Some("provider unreachable"));
    // The cursor survives the failure so the window is retried.
    assert_eq!(state.last_pull_at, Some(42));

    // An errored collection can be claimed again next tick.
    assert!(store.claim_collection("col-1").await.unwrap());
}

#[tokio::test]
async fn stale_syncing_rows_are_reset() {
    let (_dir, store) = test_store().await;

    store.claim_collection("col-1").await.unwrap();

    // A large threshold leaves the fresh claim alone.
    assert_eq!(store.reset_stale_syncing(3600).await.unwrap(), 0);
    // A negative threshold puts the cutoff in the future, so the claim
    // counts as stale, as it would after a process restart.
    assert_eq!(store.reset_stale_syncing(-10).await.unwrap(), 1);

    let state = store.sync_state("col-1").await.unwrap().unwrap();
    assert_eq!(state.status.as_str(), "idle");
}

#[tokio::test]
async fn every_registered_provider_is_pulled() {
    let (_dir, store) = test_store().await;

    // The first provider holds nothing; the document lives in the second.
    let alpha: Arc<dyn UpstreamClient> = Arc::new(FakeUpstream::with_source("alpha", Vec::new()));
    let beta: Arc<dyn UpstreamClient> = Arc::new(FakeUpstream::with_source(
        "beta",
        vec![FakeUpstream::doc("b1", "Beta doc", "beta body", 50)],
    ));
    let registry = Arc::new(ProviderRegistry::from_clients(vec![
        ("alpha".to_string(), alpha),
        ("beta".to_string(), beta),
    ]));
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new());

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        registry,
        embedder,
        vec!["col-beta".to_string()],
        Duration::from_secs(300),
    );

    orchestrator.sync_now(Some("col-beta".to_string())).await;
    // Shutdown waits for the out-of-band run before returning.
    orchestrator.shutdown().await;

    let item = store.find_by_upstream("beta", "b1").await.unwrap();
    assert!(item.is_some(), "document from the non-first provider must be mirrored");

    let state = store.sync_state("col-beta").await.unwrap().unwrap();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.last_pull_at, Some(50));
}

#[tokio::test]
async fn full_resync_rebuilds_the_mirror_from_scratch() {
    let (_dir, store) = test_store().await;

    // Pre-existing local state that should not survive the wipe.
    let stale_id = store
        .create(&context_mirror::store::NewContent {
            source_type: "manual".to_string(),
            title: "Stale".to_string(),
            body: "left over".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    store.attach_tags(&stale_id, &["old".to_string()]).await.unwrap();

    let upstream: Arc<dyn UpstreamClient> = Arc::new(FakeUpstream::new(vec![
        FakeUpstream::doc("d1", "First", "body one", 100),
        FakeUpstream::doc("d2", "Second", "body two", 90),
    ]));
    let registry = Arc::new(ProviderRegistry::from_clients(vec![(
        "outline".to_string(),
        upstream,
    )]));
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new());

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        registry,
        embedder,
        vec!["col-1".to_string()],
        Duration::from_secs(300),
    );

    orchestrator.full_resync().await.unwrap();

    assert_eq!(store.content_count().await.unwrap(), 2);
    assert_eq!(store.tag_count().await.unwrap(), 0);
    assert!(store.get(&stale_id).await.is_err());
    assert!(store.find_by_upstream("outline", "d1").await.unwrap().is_some());
    assert!(store.find_by_upstream("outline", "d2").await.unwrap().is_some());
}
