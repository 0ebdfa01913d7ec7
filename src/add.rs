//! Local-first content creation, shared by `add_content` and `fetch_url`.
//!
//! The local row is written before any upstream call, so a provider outage
//! can never lose authored content. When an upstream push succeeds the row
//! is patched with the returned document id.

use tracing::warn;

use crate::embedding::{vec_to_blob, Embedder};
use crate::error::Result;
use crate::fetch;
use crate::store::{ContentUpdate, NewContent, Store};
use crate::upstream::ProviderRegistry;

/// Parameters for creating a content item.
#[derive(Debug, Clone, Default)]
pub struct AddRequest {
    pub title: String,
    pub body: String,
    /// Provider to push to. `None` uses the default provider when one is
    /// configured; an explicitly named but unconfigured provider is a
    /// configuration error.
    pub provider: Option<String>,
    pub source_type: Option<String>,
    pub tags: Vec<String>,
    pub collection_id: Option<String>,
    pub source_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Create a content item locally, then push it upstream.
///
/// Returns the local content id. An embedding failure is logged and left
/// for the next reindex to backfill; an upstream push failure is returned
/// after the local row (still retrievable by id) has been committed.
pub async fn add_content(
    store: &Store,
    registry: &ProviderRegistry,
    embedder: &dyn Embedder,
    req: AddRequest,
) -> Result<String> {
    if req.title.trim().is_empty() {
        return Err(crate::error::Error::InvalidArgument(
            "title must not be empty".to_string(),
        ));
    }
    if req.body.trim().is_empty() {
        return Err(crate::error::Error::InvalidArgument(
            "content must not be empty".to_string(),
        ));
    }

    // Resolve the push target up front so a misnamed provider is rejected
    // before any local write.
    let client = match &req.provider {
        Some(name) => Some(registry.get(name)?),
        None => registry.default_client().map(|(_, c)| c),
    };

    let source_type = req.source_type.clone().unwrap_or_else(|| "manual".to_string());

    let id = store
        .create(&NewContent {
            source_type,
            source_url: req.source_url.clone(),
            collection_id: req.collection_id.clone(),
            title: req.title.clone(),
            body: req.body.clone(),
            metadata: req.metadata.clone(),
            upstream_doc_id: None,
            upstream_updated_at: None,
        })
        .await?;

    store.attach_tags(&id, &req.tags).await?;

    match embedder.embed(&req.body).await {
        Ok(vector) => {
            store
                .upsert_vector(
                    &id,
                    &vec_to_blob(&vector),
                    embedder.model_name(),
                    embedder.dims(),
                )
                .await?;
        }
        Err(err) => {
            warn!(content = %id, "embedding failed, vector deferred to reindex: {}", err);
        }
    }

    if let Some(client) = client {
        let upstream_id = client
            .create_document(&req.title, &req.body, req.collection_id.as_deref())
            .await?;
        store
            .update(
                &id,
                &ContentUpdate {
                    upstream_doc_id: Some(upstream_id),
                    ..Default::default()
                },
            )
            .await?;
    }

    Ok(id)
}

/// Fetch a URL, extract its text, and store it as `web` content.
pub async fn fetch_url(
    store: &Store,
    registry: &ProviderRegistry,
    embedder: &dyn Embedder,
    url: &str,
    provider: Option<String>,
    tags: Vec<String>,
    collection_id: Option<String>,
) -> Result<String> {
    let page = fetch::fetch_page(url).await?;

    add_content(
        store,
        registry,
        embedder,
        AddRequest {
            title: page.title,
            body: page.body,
            provider,
            source_type: Some("web".to_string()),
            tags,
            collection_id,
            source_url: Some(page.url),
            metadata: None,
        },
    )
    .await
}

/// Concatenated bodies of every document in the prompts collection,
/// newest first, separated by blank lines.
pub async fn load_personal_prompts(
    store: &Store,
    prompts_collection_id: Option<&str>,
) -> Result<String> {
    let Some(collection_id) = prompts_collection_id else {
        return Err(crate::error::Error::Configuration(
            "sync.prompts_collection_id is not configured".to_string(),
        ));
    };
    let bodies = store.collection_bodies(collection_id).await?;
    Ok(bodies.join("\n\n"))
}
