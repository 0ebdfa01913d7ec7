//! Shared fixtures: temp-file store, deterministic embedder, and an
//! in-memory upstream provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use context_mirror::db;
use context_mirror::embedding::Embedder;
use context_mirror::error::{Error, Result};
use context_mirror::migrate;
use context_mirror::models::{DocumentPage, UpstreamCollection, UpstreamDocument};
use context_mirror::store::Store;
use context_mirror::upstream::UpstreamClient;

pub async fn test_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::connect(&dir.path().join("test.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (dir, Store::new(pool))
}

/// Deterministic embedder: returns a fixed vector per known text, or a
/// length-derived fallback. Never touches the network.
pub struct FakeEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    pub fail: bool,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            fail: true,
        }
    }

    pub fn set(&self, text: &str, vector: Vec<f32>) {
        self.vectors
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(Error::Embedding("fake embedder down".to_string()));
        }
        let vectors = self.vectors.lock().unwrap();
        Ok(texts
            .iter()
            .map(|t| {
                vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![t.len() as f32, 1.0, 0.0])
            })
            .collect())
    }
}

/// In-memory upstream provider serving a fixed document list, newest
/// first, with counters for pagination assertions.
pub struct FakeUpstream {
    source: &'static str,
    docs: Mutex<Vec<UpstreamDocument>>,
    pub page_size_seen: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new(docs: Vec<UpstreamDocument>) -> Self {
        Self::with_source("outline", docs)
    }

    pub fn with_source(source: &'static str, mut docs: Vec<UpstreamDocument>) -> Self {
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Self {
            source,
            docs: Mutex::new(docs),
            page_size_seen: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn doc(id: &str, title: &str, body: &str, updated_at: i64) -> UpstreamDocument {
        UpstreamDocument {
            id: id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            updated_at,
            created_at: Some(updated_at),
        }
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstream {
    fn source_type(&self) -> &'static str {
        self.source
    }

    async fn create_document(
        &self,
        title: &str,
        body: &str,
        _collection_id: Option<&str>,
    ) -> Result<String> {
        let mut docs = self.docs.lock().unwrap();
        let id = format!("up-{}", docs.len() + 1);
        docs.push(UpstreamDocument {
            id: id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            updated_at: 0,
            created_at: Some(0),
        });
        Ok(id)
    }

    async fn update_document(&self, doc_id: &str, body: &str) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        match docs.iter_mut().find(|d| d.id == doc_id) {
            Some(doc) => {
                doc.body = body.to_string();
                Ok(())
            }
            None => Err(Error::NotFound(format!("doc {}", doc_id))),
        }
    }

    async fn get_document(&self, doc_id: &str) -> Result<UpstreamDocument> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.lock().unwrap();
        docs.iter()
            .find(|d| d.id == doc_id)
            .cloned()
            .ok_or_else(|| Error::Upstream(format!("doc {} missing upstream", doc_id)))
    }

    async fn list_documents(
        &self,
        _collection_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<DocumentPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.page_size_seen.store(limit as usize, Ordering::SeqCst);

        let docs = self.docs.lock().unwrap();
        let total = docs.len();
        let start = (offset.max(0) as usize).min(total);
        let end = (start + limit.max(0) as usize).min(total);

        Ok(DocumentPage {
            documents: docs[start..end].to_vec(),
            has_more: end < total,
        })
    }

    async fn list_collections(&self) -> Result<Vec<UpstreamCollection>> {
        Ok(vec![UpstreamCollection {
            id: "col-1".to_string(),
            name: "Test".to_string(),
            description: String::new(),
        }])
    }
}
