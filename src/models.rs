//! Core data models.
//!
//! These types represent the content rows, sync bookkeeping, and normalized
//! upstream documents that flow between the store, the sync engine, and the
//! tool surface.

use serde::Serialize;

/// A stored content item, the local mirror of a document.
#[derive(Debug, Clone, Serialize)]
pub struct ContentItem {
    pub id: String,
    pub source_type: String,
    pub source_url: Option<String>,
    pub collection_id: Option<String>,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
    /// Provider-side document id; unique per source_type when present.
    pub upstream_doc_id: Option<String>,
    /// Provider-side update timestamp (epoch seconds).
    pub upstream_updated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A content item together with its tag names.
#[derive(Debug, Clone, Serialize)]
pub struct ContentWithTags {
    #[serde(flatten)]
    pub item: ContentItem,
    pub tags: Vec<String>,
}

/// Per-source document counts for `list_sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source_type: String,
    pub count: i64,
}

/// Sync status of one collection.
///
/// Transitions are `idle → syncing → {idle, error}`; the `idle → syncing`
/// step is a conditional UPDATE so a collection can never be claimed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> SyncStatus {
        match s {
            "syncing" => SyncStatus::Syncing,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Idle,
        }
    }
}

/// One row of `sync_state`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub collection_id: String,
    pub last_pull_at: Option<i64>,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub updated_at: i64,
}

/// Append-only audit entry for a sync-affecting operation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub collection_id: Option<String>,
    /// `create`, `update`, or `error`.
    pub operation: String,
    pub content_id: Option<String>,
    pub upstream_doc_id: Option<String>,
    pub detail: Option<String>,
    pub created_at: i64,
}

/// A ranked hit returned by the hybrid search engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    /// Body text, truncated to 500 chars with an ellipsis when longer.
    pub content: String,
    pub source_type: String,
    pub source_url: Option<String>,
    pub collection_id: Option<String>,
    pub upstream_doc_id: Option<String>,
    pub score: f64,
    pub updated_at: i64,
}

/// Normalized document from any upstream provider.
#[derive(Debug, Clone)]
pub struct UpstreamDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Epoch seconds, normalized from each provider's timestamp format.
    pub updated_at: i64,
    pub created_at: Option<i64>,
}

/// Normalized collection/folder from any upstream provider.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamCollection {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// One page of document summaries, sorted by update time descending.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub documents: Vec<UpstreamDocument>,
    pub has_more: bool,
}
