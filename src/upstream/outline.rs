//! Outline API client.
//!
//! Outline's API is POST-only RPC (`/documents.list`, `/documents.info`,
//! ...) with bearer auth and RFC 3339 timestamps.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::config::OutlineConfig;
use crate::error::{Error, Result};
use crate::models::{DocumentPage, UpstreamCollection, UpstreamDocument};

use super::UpstreamClient;

pub struct OutlineClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    default_collection: Option<String>,
}

#[derive(Deserialize)]
struct OutlineDoc {
    id: String,
    title: String,
    #[serde(default)]
    text: String,
    #[serde(rename = "updatedAt")]
    updated_at: String,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct OutlineCollection {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(rename = "nextPath")]
    next_path: Option<String>,
}

impl OutlineClient {
    pub fn new(config: &OutlineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            default_collection: config.default_collection.clone(),
        })
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.api_base, endpoint);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("outline request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "outline API error {} on {}: {}",
                status, endpoint, body_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid outline response: {}", e)))
    }
}

fn parse_timestamp(value: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp())
        .map_err(|e| Error::Upstream(format!("invalid outline timestamp '{}': {}", value, e)))
}

fn normalize_doc(doc: OutlineDoc) -> Result<UpstreamDocument> {
    let updated_at = parse_timestamp(&doc.updated_at)?;
    let created_at = doc.created_at.as_deref().map(parse_timestamp).transpose()?;
    Ok(UpstreamDocument {
        id: doc.id,
        title: doc.title,
        body: doc.text,
        updated_at,
        created_at,
    })
}

#[async_trait]
impl UpstreamClient for OutlineClient {
    fn source_type(&self) -> &'static str {
        "outline"
    }

    async fn create_document(
        &self,
        title: &str,
        body: &str,
        collection_id: Option<&str>,
    ) -> Result<String> {
        let collection = collection_id
            .map(str::to_string)
            .or_else(|| self.default_collection.clone())
            .ok_or_else(|| {
                Error::InvalidArgument(
                    "no collection_id given and no default collection configured".to_string(),
                )
            })?;

        let json = self
            .post(
                "documents.create",
                serde_json::json!({
                    "title": title,
                    "text": body,
                    "collectionId": collection,
                    "publish": true,
                }),
            )
            .await?;

        json.pointer("/data/id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Upstream("outline create response missing data.id".to_string()))
    }

    async fn update_document(&self, doc_id: &str, body: &str) -> Result<()> {
        self.post(
            "documents.update",
            serde_json::json!({"id": doc_id, "text": body}),
        )
        .await?;
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<UpstreamDocument> {
        let json = self
            .post("documents.info", serde_json::json!({"id": doc_id}))
            .await?;

        let doc: OutlineDoc = serde_json::from_value(
            json.get("data")
                .cloned()
                .ok_or_else(|| Error::Upstream("outline response missing data".to_string()))?,
        )?;
        normalize_doc(doc)
    }

    async fn list_documents(
        &self,
        collection_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<DocumentPage> {
        let json = self
            .post(
                "documents.list",
                serde_json::json!({
                    "collectionId": collection_id,
                    "limit": limit,
                    "offset": offset,
                    "sort": "updatedAt",
                    "direction": "DESC",
                }),
            )
            .await?;

        let docs: Vec<OutlineDoc> = serde_json::from_value(
            json.get("data")
                .cloned()
                .unwrap_or(serde_json::Value::Array(Vec::new())),
        )?;

        let documents = docs
            .into_iter()
            .map(normalize_doc)
            .collect::<Result<Vec<_>>>()?;

        let has_more = json
            .get("pagination")
            .and_then(|p| serde_json::from_value::<Pagination>(p.clone()).ok())
            .and_then(|p| p.next_path)
            .is_some();

        Ok(DocumentPage {
            documents,
            has_more,
        })
    }

    async fn list_collections(&self) -> Result<Vec<UpstreamCollection>> {
        let json = self.post("collections.list", serde_json::json!({})).await?;

        let collections: Vec<OutlineCollection> = serde_json::from_value(
            json.get("data")
                .cloned()
                .unwrap_or(serde_json::Value::Array(Vec::new())),
        )?;

        Ok(collections
            .into_iter()
            .map(|c| UpstreamCollection {
                id: c.id,
                name: c.name,
                description: c.description.unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_parse_rfc3339() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:10Z").unwrap(), 10);
        assert_eq!(
            parse_timestamp("2024-01-29T14:30:45.123+00:00").unwrap(),
            1706538645
        );
        assert!(parse_timestamp("not a date").is_err());
    }

    #[test]
    fn doc_normalization_handles_missing_text() {
        let doc: OutlineDoc = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "title": "Notes",
            "updatedAt": "2024-01-29T14:30:45Z",
            "createdAt": null,
        }))
        .unwrap();
        let norm = normalize_doc(doc).unwrap();
        assert_eq!(norm.body, "");
        assert!(norm.created_at.is_none());
    }
}
