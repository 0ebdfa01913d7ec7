//! Content store: the durable table of content items, tags, and sync
//! bookkeeping.
//!
//! [`Store`] is an explicitly constructed handle over the SQLite pool, passed
//! to each component (no globals). Every write that touches title or body
//! also rewrites the matching `content_fts` row inside the same transaction,
//! so the lexical index can never drift from the content table. Embedding
//! regeneration is left to the caller, which holds the embedding client.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    ContentItem, ContentWithTags, SourceCount, SyncLogEntry, SyncState, SyncStatus,
};

/// Fields for creating a content row.
#[derive(Debug, Clone, Default)]
pub struct NewContent {
    pub source_type: String,
    pub source_url: Option<String>,
    pub collection_id: Option<String>,
    pub title: String,
    pub body: String,
    pub metadata: Option<serde_json::Value>,
    pub upstream_doc_id: Option<String>,
    pub upstream_updated_at: Option<i64>,
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub upstream_doc_id: Option<String>,
    pub upstream_updated_at: Option<i64>,
    pub collection_id: Option<String>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Content ============

    /// Insert a content row and its lexical index entry, returning the new id.
    pub async fn create(&self, item: &NewContent) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let metadata_json = match &item.metadata {
            Some(value) => serde_json::to_string(value)?,
            None => "{}".to_string(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO content (id, source_type, source_url, collection_id, title, body,
                                 metadata_json, upstream_doc_id, upstream_updated_at,
                                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&item.source_type)
        .bind(&item.source_url)
        .bind(&item.collection_id)
        .bind(&item.title)
        .bind(&item.body)
        .bind(&metadata_json)
        .bind(&item.upstream_doc_id)
        .bind(item.upstream_updated_at)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO content_fts (content_id, title, body) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&item.title)
            .bind(&item.body)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Apply a partial update, rewriting the lexical index entry in the same
    /// transaction.
    pub async fn update(&self, id: &str, update: &ContentUpdate) -> Result<()> {
        let existing = self.get(id).await?;
        let now = Utc::now().timestamp();

        let title = update.title.clone().unwrap_or(existing.title);
        let body = update.body.clone().unwrap_or(existing.body);
        let metadata = update.metadata.clone().unwrap_or(existing.metadata);
        let metadata_json = serde_json::to_string(&metadata)?;
        let upstream_doc_id = update
            .upstream_doc_id
            .clone()
            .or(existing.upstream_doc_id);
        let upstream_updated_at = update.upstream_updated_at.or(existing.upstream_updated_at);
        let collection_id = update.collection_id.clone().or(existing.collection_id);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE content
            SET title = ?, body = ?, metadata_json = ?, upstream_doc_id = ?,
                upstream_updated_at = ?, collection_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&title)
        .bind(&body)
        .bind(&metadata_json)
        .bind(&upstream_doc_id)
        .bind(upstream_updated_at)
        .bind(&collection_id)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE content_fts SET title = ?, body = ? WHERE content_id = ?")
            .bind(&title)
            .bind(&body)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<ContentItem> {
        let row = sqlx::query(
            r#"
            SELECT id, source_type, source_url, collection_id, title, body, metadata_json,
                   upstream_doc_id, upstream_updated_at, created_at, updated_at
            FROM content WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_item(&row),
            None => Err(Error::NotFound(format!("content {}", id))),
        }
    }

    pub async fn get_with_tags(&self, id: &str) -> Result<ContentWithTags> {
        let item = self.get(id).await?;

        let tag_rows = sqlx::query(
            r#"
            SELECT t.name FROM tags t
            JOIN content_tags ct ON t.id = ct.tag_id
            WHERE ct.content_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let tags = tag_rows.iter().map(|r| r.get("name")).collect();
        Ok(ContentWithTags { item, tags })
    }

    pub async fn find_by_upstream(
        &self,
        source_type: &str,
        upstream_doc_id: &str,
    ) -> Result<Option<ContentItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, source_type, source_url, collection_id, title, body, metadata_json,
                   upstream_doc_id, upstream_updated_at, created_at, updated_at
            FROM content WHERE source_type = ? AND upstream_doc_id = ?
            "#,
        )
        .bind(source_type)
        .bind(upstream_doc_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_item(&r)).transpose()
    }

    pub async fn list_by_source(&self) -> Result<Vec<SourceCount>> {
        let rows = sqlx::query(
            "SELECT source_type, COUNT(*) AS count FROM content GROUP BY source_type ORDER BY count DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SourceCount {
                source_type: row.get("source_type"),
                count: row.get("count"),
            })
            .collect())
    }

    /// Bodies of all documents in one collection, newest upstream first.
    pub async fn collection_bodies(&self, collection_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM content
            WHERE collection_id = ?
            ORDER BY upstream_updated_at DESC, created_at DESC
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("body")).collect())
    }

    // ============ Tags ============

    /// Attach tags by name, creating missing tags. Idempotent: existing
    /// tag names resolve to their stored id, duplicate pairs are ignored.
    ///
    /// The insert-or-ignore plus re-read runs inside one transaction so two
    /// writers attaching the same new name can never create two tag rows.
    pub async fn attach_tags(&self, content_id: &str, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for name in names {
            sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
                .bind(name)
                .execute(&mut *tx)
                .await?;

            let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO content_tags (content_id, tag_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(content_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ============ Vectors ============

    pub async fn upsert_vector(
        &self,
        content_id: &str,
        embedding: &[u8],
        model: &str,
        dims: usize,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_vectors (content_id, embedding, model, dims)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                embedding = excluded.embedding,
                model = excluded.model,
                dims = excluded.dims
            "#,
        )
        .bind(content_id)
        .bind(embedding)
        .bind(model)
        .bind(dims as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop vectors produced by a different model or dimension.
    pub async fn delete_stale_vectors(&self, model: &str, dims: usize) -> Result<u64> {
        let result = sqlx::query("DELETE FROM content_vectors WHERE model <> ? OR dims <> ?")
            .bind(model)
            .bind(dims as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Content rows with no stored vector, in stable id order.
    pub async fn content_missing_vectors(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.body FROM content c
            LEFT JOIN content_vectors v ON v.content_id = c.id
            WHERE v.content_id IS NULL
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("body")))
            .collect())
    }

    // ============ Sync state ============

    /// Atomically claim a collection for syncing.
    ///
    /// Returns `false` when the collection is already `syncing`. The decision
    /// to launch and the status flip are the same conditional UPDATE, so two
    /// engines can never hold the same collection.
    pub async fn claim_collection(&self, collection_id: &str) -> Result<bool> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO sync_state (collection_id, status, created_at, updated_at)
            VALUES (?, 'idle', ?, ?)
            ON CONFLICT(collection_id) DO NOTHING
            "#,
        )
        .bind(collection_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE sync_state SET status = 'syncing', updated_at = ?
            WHERE collection_id = ? AND status <> 'syncing'
            "#,
        )
        .bind(now)
        .bind(collection_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Release a claimed collection.
    ///
    /// On success the cursor advances to `last_pull_at` (when given) and
    /// status returns to `idle`; on failure the cursor is left untouched so
    /// the next cycle retries the same window.
    pub async fn finish_collection(
        &self,
        collection_id: &str,
        last_pull_at: Option<i64>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().timestamp();

        match error {
            Some(message) => {
                sqlx::query(
                    r#"
                    UPDATE sync_state SET status = 'error', error_message = ?, updated_at = ?
                    WHERE collection_id = ?
                    "#,
                )
                .bind(message)
                .bind(now)
                .bind(collection_id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE sync_state
                    SET status = 'idle', error_message = NULL,
                        last_pull_at = COALESCE(?, last_pull_at), updated_at = ?
                    WHERE collection_id = ?
                    "#,
                )
                .bind(last_pull_at)
                .bind(now)
                .bind(collection_id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn sync_state(&self, collection_id: &str) -> Result<Option<SyncState>> {
        let row = sqlx::query(
            r#"
            SELECT collection_id, last_pull_at, status, error_message, updated_at
            FROM sync_state WHERE collection_id = ?
            "#,
        )
        .bind(collection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_sync_state(&r)))
    }

    pub async fn sync_states(&self) -> Result<Vec<SyncState>> {
        let rows = sqlx::query(
            r#"
            SELECT collection_id, last_pull_at, status, error_message, updated_at
            FROM sync_state ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_sync_state).collect())
    }

    /// Reset `syncing` rows that have not been touched within `stale_secs`.
    /// Run at startup: a claim that old belongs to a previous process.
    pub async fn reset_stale_syncing(&self, stale_secs: i64) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - stale_secs;
        let result = sqlx::query(
            "UPDATE sync_state SET status = 'idle' WHERE status = 'syncing' AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ============ Sync log ============

    pub async fn write_sync_log(
        &self,
        collection_id: &str,
        operation: &str,
        content_id: Option<&str>,
        upstream_doc_id: Option<&str>,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_log (collection_id, operation, content_id, upstream_doc_id, detail, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection_id)
        .bind(operation)
        .bind(content_id)
        .bind(upstream_doc_id)
        .bind(detail)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn sync_history(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, collection_id, operation, content_id, upstream_doc_id, detail, created_at
            FROM sync_log ORDER BY created_at DESC, id DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SyncLogEntry {
                id: row.get("id"),
                collection_id: row.get("collection_id"),
                operation: row.get("operation"),
                content_id: row.get("content_id"),
                upstream_doc_id: row.get("upstream_doc_id"),
                detail: row.get("detail"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Counts of `create`/`update` sync log rows, used by tests and stats.
    pub async fn sync_log_counts(&self, collection_id: &str) -> Result<(i64, i64)> {
        let creates: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_log WHERE collection_id = ? AND operation = 'create'",
        )
        .bind(collection_id)
        .fetch_one(&self.pool)
        .await?;
        let updates: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_log WHERE collection_id = ? AND operation = 'update'",
        )
        .bind(collection_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((creates, updates))
    }

    // ============ Stats ============

    /// Wipe every mirrored row: content (vectors and tag links cascade),
    /// the lexical index, tags, and all sync bookkeeping. Used by full
    /// resync before re-pulling from scratch.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM content_fts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM content").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM tags").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sync_state").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sync_log").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn content_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM content")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn tag_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM tags")
            .fetch_one(&self.pool)
            .await?)
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<ContentItem> {
    let metadata_json: String = row.get("metadata_json");
    let metadata: serde_json::Value =
        serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null);

    Ok(ContentItem {
        id: row.get("id"),
        source_type: row.get("source_type"),
        source_url: row.get("source_url"),
        collection_id: row.get("collection_id"),
        title: row.get("title"),
        body: row.get("body"),
        metadata,
        upstream_doc_id: row.get("upstream_doc_id"),
        upstream_updated_at: row.get("upstream_updated_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_sync_state(row: &sqlx::sqlite::SqliteRow) -> SyncState {
    let status: String = row.get("status");
    SyncState {
        collection_id: row.get("collection_id"),
        last_pull_at: row.get("last_pull_at"),
        status: SyncStatus::parse(&status),
        error_message: row.get("error_message"),
        updated_at: row.get("updated_at"),
    }
}
