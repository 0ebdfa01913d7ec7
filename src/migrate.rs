use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Main content storage
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_url TEXT,
            collection_id TEXT,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            upstream_doc_id TEXT,
            upstream_updated_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One local mirror per remote document
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_content_upstream_unique
        ON content(source_type, upstream_doc_id)
        WHERE upstream_doc_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 virtual table over content.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='content_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE content_fts USING fts5(
                content_id UNINDEXED,
                title,
                body
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Embedding vectors, one per content row. The model/dims columns make
    // reindexing resumable: stale rows are detected by mismatch.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_vectors (
            content_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            FOREIGN KEY (content_id) REFERENCES content(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tags
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_tags (
            content_id TEXT NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (content_id, tag_id),
            FOREIGN KEY (content_id) REFERENCES content(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Sync state tracking, one row per collection
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            collection_id TEXT PRIMARY KEY,
            last_pull_at INTEGER,
            status TEXT NOT NULL DEFAULT 'idle',
            error_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only sync audit log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection_id TEXT,
            operation TEXT NOT NULL,
            content_id TEXT,
            upstream_doc_id TEXT,
            detail TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Secondary indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_upstream_doc ON content(upstream_doc_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_created ON content(created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_collection ON content(collection_id, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_log_collection ON sync_log(collection_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
