//! Tool surface: the named operations exposed over `POST /tools/{name}`.
//!
//! Every operation implements [`Tool`] and registers in a [`ToolRegistry`];
//! the HTTP server dispatches to them through one handler. Tools receive a
//! [`ToolContext`] holding the shared store, providers, embedder, and
//! orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::add::{self, AddRequest};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::search;
use crate::store::Store;
use crate::sync::SyncOrchestrator;
use crate::upstream::ProviderRegistry;

/// Shared state handed to every tool invocation.
pub struct ToolContext {
    pub store: Store,
    pub registry: Arc<ProviderRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub config: Arc<Config>,
}

/// A named operation callable over HTTP.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name, lowercase with underscores.
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// OpenAI function-calling JSON Schema for the parameters.
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Tool metadata returned by `GET /tools/list`.
#[derive(Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with every builtin tool.
    pub fn builtin() -> Self {
        Self {
            tools: vec![
                Box::new(SearchTool),
                Box::new(AddContentTool),
                Box::new(FetchUrlTool),
                Box::new(GetContentTool),
                Box::new(ListSourcesTool),
                Box::new(SyncNowTool),
                Box::new(GetSyncStatusTool),
                Box::new(ListSyncHistoryTool),
                Box::new(LoadPersonalPromptsTool),
            ],
        }
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }
}

// ============ Parameter helpers ============

fn require_str(params: &Value, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::InvalidArgument(format!("'{}' is required", key)))
}

fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn opt_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

fn opt_str_array(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ============ search ============

struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }
    fn description(&self) -> &str {
        "Hybrid keyword + semantic search over stored content"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query text" },
                "limit": { "type": "integer", "description": "Maximum results (default 10)" },
                "source_types": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict to these source types"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = require_str(&params, "query")?;
        let limit = opt_i64(&params, "limit").unwrap_or(10);
        if limit < 1 {
            return Err(Error::InvalidArgument("'limit' must be >= 1".to_string()));
        }
        let source_types = opt_str_array(&params, "source_types");

        let results = search::hybrid_search(
            &ctx.store,
            ctx.embedder.as_ref(),
            &query,
            limit as usize,
            &source_types,
        )
        .await?;

        let count = results.len();
        Ok(json!({ "results": results, "count": count }))
    }
}

// ============ add_content ============

struct AddContentTool;

#[async_trait]
impl Tool for AddContentTool {
    fn name(&self) -> &str {
        "add_content"
    }
    fn description(&self) -> &str {
        "Store a content item locally and push it to the upstream provider"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Body text" },
                "title": { "type": "string", "description": "Title" },
                "provider": { "type": "string", "description": "Upstream provider name" },
                "source_type": { "type": "string", "description": "Source type (default: manual)" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "collection_id": { "type": "string" },
                "source_url": { "type": "string" },
                "metadata": { "type": "object" }
            },
            "required": ["content", "title"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = add::add_content(
            &ctx.store,
            &ctx.registry,
            ctx.embedder.as_ref(),
            AddRequest {
                title: require_str(&params, "title")?,
                body: require_str(&params, "content")?,
                provider: opt_str(&params, "provider"),
                source_type: opt_str(&params, "source_type"),
                tags: opt_str_array(&params, "tags"),
                collection_id: opt_str(&params, "collection_id"),
                source_url: opt_str(&params, "source_url"),
                metadata: params.get("metadata").filter(|m| m.is_object()).cloned(),
            },
        )
        .await?;

        Ok(json!({ "id": id }))
    }
}

// ============ fetch_url ============

struct FetchUrlTool;

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }
    fn description(&self) -> &str {
        "Fetch a web page, extract its text, and store it as content"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to fetch" },
                "provider": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "collection_id": { "type": "string" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let url = require_str(&params, "url")?;
        let id = add::fetch_url(
            &ctx.store,
            &ctx.registry,
            ctx.embedder.as_ref(),
            &url,
            opt_str(&params, "provider"),
            opt_str_array(&params, "tags"),
            opt_str(&params, "collection_id"),
        )
        .await?;

        Ok(json!({ "id": id }))
    }
}

// ============ get_content ============

struct GetContentTool;

#[async_trait]
impl Tool for GetContentTool {
    fn name(&self) -> &str {
        "get_content"
    }
    fn description(&self) -> &str {
        "Retrieve a content item with its tags by id"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content_id": { "type": "string", "description": "Content id" }
            },
            "required": ["content_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let content_id = require_str(&params, "content_id")?;
        let item = ctx.store.get_with_tags(&content_id).await?;
        Ok(serde_json::to_value(item)?)
    }
}

// ============ list_sources ============

struct ListSourcesTool;

#[async_trait]
impl Tool for ListSourcesTool {
    fn name(&self) -> &str {
        "list_sources"
    }
    fn description(&self) -> &str {
        "Count stored content items per source type"
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let sources = ctx.store.list_by_source().await?;
        Ok(json!({ "sources": sources }))
    }
}

// ============ sync_now ============

struct SyncNowTool;

#[async_trait]
impl Tool for SyncNowTool {
    fn name(&self) -> &str {
        "sync_now"
    }
    fn description(&self) -> &str {
        "Trigger an immediate sync for one collection or all configured ones"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "collection_id": { "type": "string", "description": "Limit to one collection" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let collection_id = opt_str(&params, "collection_id");
        ctx.orchestrator.sync_now(collection_id.clone()).await;
        Ok(json!({ "accepted": true, "collection_id": collection_id }))
    }
}

// ============ get_sync_status ============

struct GetSyncStatusTool;

#[async_trait]
impl Tool for GetSyncStatusTool {
    fn name(&self) -> &str {
        "get_sync_status"
    }
    fn description(&self) -> &str {
        "Per-collection sync state"
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let states = ctx.orchestrator.status().await?;
        Ok(json!({ "collections": states }))
    }
}

// ============ list_sync_history ============

struct ListSyncHistoryTool;

#[async_trait]
impl Tool for ListSyncHistoryTool {
    fn name(&self) -> &str {
        "list_sync_history"
    }
    fn description(&self) -> &str {
        "Recent sync log entries, newest first"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Maximum entries (default 50)" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let limit = opt_i64(&params, "limit").unwrap_or(50);
        if limit < 1 {
            return Err(Error::InvalidArgument("'limit' must be >= 1".to_string()));
        }
        let entries = ctx.orchestrator.history(limit).await?;
        Ok(json!({ "entries": entries }))
    }
}

// ============ load_personal_prompts ============

struct LoadPersonalPromptsTool;

#[async_trait]
impl Tool for LoadPersonalPromptsTool {
    fn name(&self) -> &str {
        "load_personal_prompts"
    }
    fn description(&self) -> &str {
        "Concatenated text of every document in the prompts collection"
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "required": [] })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let text = add::load_personal_prompts(
            &ctx.store,
            ctx.config.sync.prompts_collection_id.as_deref(),
        )
        .await?;
        Ok(json!({ "prompts": text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_builtins() {
        let registry = ToolRegistry::builtin();
        for name in [
            "search",
            "add_content",
            "fetch_url",
            "get_content",
            "list_sources",
            "sync_now",
            "get_sync_status",
            "list_sync_history",
            "load_personal_prompts",
        ] {
            assert!(registry.find(name).is_some(), "missing tool {}", name);
        }
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn param_helpers() {
        let params = json!({
            "query": "rust",
            "limit": 5,
            "tags": ["a", "b"],
            "empty": ""
        });
        assert_eq!(require_str(&params, "query").unwrap(), "rust");
        assert!(require_str(&params, "missing").is_err());
        assert!(require_str(&params, "empty").is_err());
        assert_eq!(opt_i64(&params, "limit"), Some(5));
        assert_eq!(opt_str_array(&params, "tags"), vec!["a", "b"]);
        assert!(opt_str_array(&params, "missing").is_empty());
    }
}
