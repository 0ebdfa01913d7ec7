//! Pull sync engine: reconcile one collection against its upstream
//! provider.
//!
//! The provider lists documents newest-updated-first, so once a summary is
//! no newer than the stored cursor every remaining page is older and
//! pagination stops (except on the first-ever sync, which walks the full
//! history). Full bodies are fetched only for documents that will actually
//! be created or updated.
//!
//! Per-document failures are isolated: they produce an `error` sync log
//! entry and the cycle moves on. Only a failure of the page listing itself
//! is fatal for the cycle, in which case the cursor is left untouched so
//! the next cycle retries the same window.

use tracing::{debug, warn};

use crate::embedding::{vec_to_blob, Embedder};
use crate::error::Result;
use crate::models::UpstreamDocument;
use crate::store::{ContentUpdate, NewContent, Store};
use crate::upstream::UpstreamClient;

const PAGE_SIZE: i64 = 100;

/// Outcome of one pull cycle.
#[derive(Debug, Default, Clone)]
pub struct PullStats {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Newest remote update timestamp observed; the new cursor on success.
    pub newest_seen: Option<i64>,
}

/// Run one pull cycle for a collection.
///
/// `last_pull_at` is the cursor from the previous successful cycle; `None`
/// means full historical sync. The caller owns the `sync_state` claim and
/// release.
pub async fn pull_collection(
    store: &Store,
    client: &dyn UpstreamClient,
    embedder: &dyn Embedder,
    collection_id: &str,
    last_pull_at: Option<i64>,
) -> Result<PullStats> {
    let source_type = client.source_type();
    let mut stats = PullStats::default();
    let mut offset = 0i64;

    'pages: loop {
        let page = client
            .list_documents(collection_id, PAGE_SIZE, offset)
            .await?;

        if page.documents.is_empty() {
            break;
        }

        for summary in &page.documents {
            stats.newest_seen = Some(stats.newest_seen.unwrap_or(i64::MIN).max(summary.updated_at));

            // Sorted newest-first: the rest of the history is older.
            if let Some(cursor) = last_pull_at {
                if summary.updated_at <= cursor {
                    break 'pages;
                }
            }

            let local = store.find_by_upstream(source_type, &summary.id).await?;

            let needs_write = match &local {
                None => true,
                Some(item) => match item.upstream_updated_at {
                    None => true,
                    Some(local_ts) => summary.updated_at > local_ts,
                },
            };

            // Backfill collection ids recorded before collection tracking.
            if let Some(item) = &local {
                if item.collection_id.is_none() && !needs_write {
                    store
                        .update(
                            &item.id,
                            &ContentUpdate {
                                collection_id: Some(collection_id.to_string()),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }

            if !needs_write {
                stats.skipped += 1;
                continue;
            }

            match sync_document(store, client, embedder, collection_id, summary, &local).await {
                Ok(created) => {
                    if created {
                        stats.created += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        collection = collection_id,
                        doc = %summary.id,
                        "document sync failed: {}",
                        err
                    );
                    stats.errors += 1;
                    store
                        .write_sync_log(
                            collection_id,
                            "error",
                            None,
                            Some(&summary.id),
                            Some(&err.to_string()),
                        )
                        .await?;
                }
            }
        }

        if !page.has_more {
            break;
        }
        offset += PAGE_SIZE;
    }

    debug!(
        collection = collection_id,
        created = stats.created,
        updated = stats.updated,
        skipped = stats.skipped,
        errors = stats.errors,
        "pull cycle complete"
    );
    Ok(stats)
}

/// Fetch the full body and create or update the local mirror. Returns
/// `true` when a new row was created.
///
/// The content write is durable even when the embedding call fails
/// afterwards; a missing vector is backfilled by the next reindex.
async fn sync_document(
    store: &Store,
    client: &dyn UpstreamClient,
    embedder: &dyn Embedder,
    collection_id: &str,
    summary: &UpstreamDocument,
    local: &Option<crate::models::ContentItem>,
) -> Result<bool> {
    let full = client.get_document(&summary.id).await?;

    let (content_id, created) = match local {
        None => {
            let id = store
                .create(&NewContent {
                    source_type: client.source_type().to_string(),
                    source_url: None,
                    collection_id: Some(collection_id.to_string()),
                    title: full.title.clone(),
                    body: full.body.clone(),
                    metadata: None,
                    upstream_doc_id: Some(full.id.clone()),
                    upstream_updated_at: Some(full.updated_at),
                })
                .await?;
            (id, true)
        }
        Some(item) => {
            store
                .update(
                    &item.id,
                    &ContentUpdate {
                        title: Some(full.title.clone()),
                        body: Some(full.body.clone()),
                        upstream_updated_at: Some(full.updated_at),
                        collection_id: Some(collection_id.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
            (item.id.clone(), false)
        }
    };

    store
        .write_sync_log(
            collection_id,
            if created { "create" } else { "update" },
            Some(&content_id),
            Some(&full.id),
            None,
        )
        .await?;

    let vector = embedder.embed(&full.body).await?;
    store
        .upsert_vector(
            &content_id,
            &vec_to_blob(&vector),
            embedder.model_name(),
            embedder.dims(),
        )
        .await?;

    Ok(created)
}
