//! Trilium Notes ETAPI client.
//!
//! ETAPI is plain REST with the token sent unprefixed in the Authorization
//! header. Trilium has no server-side pagination for children, so
//! `list_documents` fetches all children of the parent note, sorts them by
//! update time descending, and paginates locally.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::config::TriliumConfig;
use crate::error::{Error, Result};
use crate::models::{DocumentPage, UpstreamCollection, UpstreamDocument};

use super::UpstreamClient;

pub struct TriliumClient {
    client: reqwest::Client,
    api_base: String,
    api_token: String,
    parent_note_id: String,
}

#[derive(Deserialize)]
struct TriliumNote {
    #[serde(rename = "noteId")]
    note_id: String,
    title: String,
    #[serde(rename = "utcDateModified")]
    utc_date_modified: String,
    #[serde(rename = "utcDateCreated")]
    utc_date_created: Option<String>,
}

#[derive(Deserialize)]
struct TriliumChild {
    #[serde(rename = "noteId")]
    note_id: String,
}

impl TriliumClient {
    pub fn new(config: &TriliumConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            parent_note_id: config.parent_note_id.clone(),
        })
    }

    async fn get_raw(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.api_base, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.api_token)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("trilium request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "trilium API error {} on {}: {}",
                status, path, body_text
            )));
        }
        Ok(response)
    }

    async fn get_note(&self, note_id: &str) -> Result<TriliumNote> {
        let response = self.get_raw(&format!("notes/{}", note_id)).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid trilium response: {}", e)))
    }

    async fn get_note_content(&self, note_id: &str) -> Result<String> {
        let response = self.get_raw(&format!("notes/{}/content", note_id)).await?;
        response
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("invalid trilium content: {}", e)))
    }

    async fn fetch_document(&self, note_id: &str) -> Result<UpstreamDocument> {
        let note = self.get_note(note_id).await?;
        let body = self.get_note_content(note_id).await.unwrap_or_default();

        let updated_at = parse_timestamp(&note.utc_date_modified)?;
        let created_at = note
            .utc_date_created
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(UpstreamDocument {
            id: note.note_id,
            title: note.title,
            body,
            updated_at,
            created_at,
        })
    }
}

/// Parse a Trilium timestamp, e.g. `"2024-01-29 14:30:45.123+0000"`.
fn parse_timestamp(value: &str) -> Result<i64> {
    DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%z")
        .map(|dt| dt.timestamp())
        .map_err(|e| Error::Upstream(format!("invalid trilium timestamp '{}': {}", value, e)))
}

#[async_trait]
impl UpstreamClient for TriliumClient {
    fn source_type(&self) -> &'static str {
        "trilium"
    }

    async fn create_document(
        &self,
        title: &str,
        body: &str,
        collection_id: Option<&str>,
    ) -> Result<String> {
        let parent = collection_id.unwrap_or(&self.parent_note_id);

        let url = format!("{}/create-note", self.api_base);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.api_token)
            .json(&serde_json::json!({
                "parentNoteId": parent,
                "title": title,
                "type": "text",
                "content": body,
            }))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("trilium request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "trilium API error {} on create-note: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid trilium response: {}", e)))?;

        json.pointer("/note/noteId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Upstream("trilium create response missing note.noteId".to_string()))
    }

    async fn update_document(&self, doc_id: &str, body: &str) -> Result<()> {
        let url = format!("{}/notes/{}/content", self.api_base, doc_id);
        let response = self
            .client
            .put(&url)
            .header("Authorization", &self.api_token)
            .header("Content-Type", "text/plain")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("trilium request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "trilium API error {} on content update: {}",
                status, body_text
            )));
        }
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<UpstreamDocument> {
        self.fetch_document(doc_id).await
    }

    async fn list_documents(
        &self,
        collection_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<DocumentPage> {
        let response = self
            .get_raw(&format!("notes/{}/children", collection_id))
            .await?;
        let children: Vec<TriliumChild> = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid trilium response: {}", e)))?;

        let mut documents = Vec::with_capacity(children.len());
        for child in children {
            documents.push(self.fetch_document(&child.note_id).await?);
        }

        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let total = documents.len();
        let start = (offset.max(0) as usize).min(total);
        let end = (start + limit.max(0) as usize).min(total);
        let page = documents[start..end].to_vec();
        let has_more = end < total;

        Ok(DocumentPage {
            documents: page,
            has_more,
        })
    }

    async fn list_collections(&self) -> Result<Vec<UpstreamCollection>> {
        let response = self.get_raw("notes/root/children").await?;
        let children: Vec<TriliumChild> = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid trilium response: {}", e)))?;

        let mut collections = Vec::with_capacity(children.len());
        for child in children {
            let note = self.get_note(&child.note_id).await?;
            collections.push(UpstreamCollection {
                id: note.note_id,
                name: note.title,
                description: String::new(),
            });
        }
        Ok(collections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_parse_trilium_format() {
        assert_eq!(
            parse_timestamp("2024-01-29 14:30:45.123+0000").unwrap(),
            1706538645
        );
        assert_eq!(
            parse_timestamp("1970-01-01 00:00:10.000+0000").unwrap(),
            10
        );
        assert!(parse_timestamp("2024-01-29T14:30:45Z").is_err());
    }
}
