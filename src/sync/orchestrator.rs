//! Background sync orchestrator.
//!
//! Owns a repeating timer; on each tick every configured collection whose
//! `sync_state` row is not already `syncing` gets a pull run. The claim is
//! a single conditional UPDATE, so the decision to launch and the status
//! flip cannot race. Collections run concurrently within a tick, and the
//! tick waits for all of them before the next one is scheduled.
//!
//! Shutdown signals the loop via a watch channel and waits up to
//! [`SHUTDOWN_TIMEOUT`] for in-flight runs. Abandoned runs leave their row
//! as `syncing`; the next process start resets rows stale for more than
//! one interval back to `idle`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{SyncLogEntry, SyncState};
use crate::store::Store;
use crate::sync::pull::pull_collection;
use crate::upstream::ProviderRegistry;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct Inner {
    store: Store,
    registry: Arc<ProviderRegistry>,
    embedder: Arc<dyn Embedder>,
    collections: Vec<String>,
    interval: Duration,
}

pub struct SyncOrchestrator {
    inner: Arc<Inner>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    background: Mutex<JoinSet<()>>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Store,
        registry: Arc<ProviderRegistry>,
        embedder: Arc<dyn Embedder>,
        collections: Vec<String>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                embedder,
                collections,
                interval,
            }),
            stop_tx,
            handle: Mutex::new(None),
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Start the background loop. Claims left over from a previous process
    /// (stale for more than one interval) are reset to idle first.
    pub async fn start(&self) -> Result<()> {
        let reset = self
            .inner
            .store
            .reset_stale_syncing(self.inner.interval.as_secs() as i64)
            .await?;
        if reset > 0 {
            info!("reset {} stale syncing collection(s) from previous run", reset);
        }

        let inner = Arc::clone(&self.inner);
        let mut stop_rx = self.stop_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            // First tick fires immediately; sync on startup is intentional.
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_all(&inner, None).await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Force an immediate run for one collection, or all configured ones.
    /// Collections already `syncing` are skipped by the claim. The run is
    /// tracked so `shutdown` waits for it like any tick.
    pub async fn sync_now(&self, collection_id: Option<String>) {
        let inner = Arc::clone(&self.inner);
        let mut tasks = self.background.lock().await;
        // Reap finished runs so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            run_all(&inner, collection_id).await;
        });
    }

    /// Clear every mirrored row (content, vectors, tags, sync bookkeeping)
    /// and pull all configured collections again from scratch. Waits for
    /// the re-pull to finish.
    pub async fn full_resync(&self) -> Result<()> {
        warn!("full resync requested, clearing local mirror");
        self.inner.store.clear_all().await?;
        run_all(&self.inner, None).await;
        Ok(())
    }

    pub async fn status(&self) -> Result<Vec<SyncState>> {
        self.inner.store.sync_states().await
    }

    pub async fn history(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        self.inner.store.sync_history(limit).await
    }

    /// Stop the loop and wait for in-flight runs, including any spawned by
    /// `sync_now`, up to a bounded timeout.
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self.handle.lock().await.take();
        let mut tasks = self.background.lock().await;
        let drain = async {
            if let Some(handle) = handle {
                let _ = handle.await;
            }
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
            warn!("sync runs did not stop within timeout, abandoning in-flight runs");
        }
    }
}

/// Run one pull per target collection, concurrently, and wait for all.
async fn run_all(inner: &Arc<Inner>, only: Option<String>) {
    let targets: Vec<String> = match only {
        Some(id) => vec![id],
        None => inner.collections.clone(),
    };
    if targets.is_empty() {
        return;
    }

    let mut set = JoinSet::new();
    for collection_id in targets {
        let inner = Arc::clone(inner);
        set.spawn(async move {
            if let Err(err) = run_collection(&inner, &collection_id).await {
                error!(collection = %collection_id, "sync run failed: {}", err);
            }
        });
    }
    while set.join_next().await.is_some() {}
}

/// Pull one collection through every registered provider.
///
/// A provider that fails for the collection (one that does not know it,
/// or is unreachable) is logged and skipped; the cycle fails only when
/// every provider fails. The cursor advances to the newest `updated_at`
/// observed across providers and never moves backwards.
async fn run_collection(inner: &Inner, collection_id: &str) -> Result<()> {
    if inner.registry.is_empty() {
        warn!("no upstream provider configured, skipping sync");
        return Ok(());
    }

    if !inner.store.claim_collection(collection_id).await? {
        info!(collection = collection_id, "already syncing, skipping");
        return Ok(());
    }

    let last_pull_at = inner
        .store
        .sync_state(collection_id)
        .await?
        .and_then(|s| s.last_pull_at);

    let mut newest_seen: Option<i64> = None;
    let mut succeeded = false;
    let mut last_error: Option<Error> = None;

    for (provider, client) in inner.registry.clients() {
        info!(
            collection = collection_id,
            provider = %provider,
            cursor = ?last_pull_at,
            "starting pull"
        );

        match pull_collection(
            &inner.store,
            client.as_ref(),
            inner.embedder.as_ref(),
            collection_id,
            last_pull_at,
        )
        .await
        {
            Ok(stats) => {
                succeeded = true;
                newest_seen = match (newest_seen, stats.newest_seen) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                info!(
                    collection = collection_id,
                    provider = %provider,
                    created = stats.created,
                    updated = stats.updated,
                    skipped = stats.skipped,
                    errors = stats.errors,
                    "pull finished"
                );
            }
            Err(err) => {
                error!(
                    collection = collection_id,
                    provider = %provider,
                    "pull failed: {}",
                    err
                );
                last_error = Some(err);
            }
        }
    }

    if succeeded {
        let cursor = match (newest_seen, last_pull_at) {
            (Some(seen), Some(prev)) => Some(seen.max(prev)),
            (seen, prev) => seen.or(prev),
        };
        inner
            .store
            .finish_collection(collection_id, cursor, None)
            .await?;
    } else {
        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all providers failed".to_string());
        inner
            .store
            .finish_collection(collection_id, None, Some(&message))
            .await?;
    }
    Ok(())
}
