//! Upstream provider abstraction.
//!
//! [`UpstreamClient`] is the normalized surface the sync engine and the
//! `add_content` path talk to; [`ProviderRegistry`] holds the clients built
//! from configuration. Providers are registered in a fixed order (outline,
//! then trilium) so "first configured" is deterministic.

pub mod outline;
pub mod trilium;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{DocumentPage, UpstreamCollection, UpstreamDocument};

pub use outline::OutlineClient;
pub use trilium::TriliumClient;

/// Normalized client for one upstream knowledge base.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Stable provider name, used as the `source_type` of mirrored content.
    fn source_type(&self) -> &'static str;

    /// Create a document, returning the provider-side id.
    async fn create_document(
        &self,
        title: &str,
        body: &str,
        collection_id: Option<&str>,
    ) -> Result<String>;

    /// Replace a document's body.
    async fn update_document(&self, doc_id: &str, body: &str) -> Result<()>;

    async fn get_document(&self, doc_id: &str) -> Result<UpstreamDocument>;

    /// One page of documents in a collection, sorted by update time
    /// descending. Pagination is offset-based regardless of the provider's
    /// native scheme.
    async fn list_documents(
        &self,
        collection_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<DocumentPage>;

    async fn list_collections(&self) -> Result<Vec<UpstreamCollection>>;
}

/// Registry of configured providers, in registration order.
pub struct ProviderRegistry {
    providers: Vec<(String, Arc<dyn UpstreamClient>)>,
    default: Option<String>,
}

impl ProviderRegistry {
    /// Build clients for every configured provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut providers: Vec<(String, Arc<dyn UpstreamClient>)> = Vec::new();

        if let Some(outline) = &config.providers.outline {
            if outline.is_configured() {
                providers.push((
                    "outline".to_string(),
                    Arc::new(OutlineClient::new(outline)?),
                ));
            }
        }
        if let Some(trilium) = &config.providers.trilium {
            if trilium.is_configured() {
                providers.push((
                    "trilium".to_string(),
                    Arc::new(TriliumClient::new(trilium)?),
                ));
            }
        }

        if let Some(name) = &config.providers.default {
            if !providers.iter().any(|(n, _)| n == name) {
                return Err(Error::Configuration(format!(
                    "default provider '{}' is not configured",
                    name
                )));
            }
        }

        Ok(Self {
            providers,
            default: config.providers.default.clone(),
        })
    }

    /// Build a registry from pre-constructed clients, for custom providers
    /// and tests.
    pub fn from_clients(clients: Vec<(String, Arc<dyn UpstreamClient>)>) -> Self {
        Self {
            providers: clients,
            default: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// All registered providers, in registration order.
    pub fn clients(&self) -> &[(String, Arc<dyn UpstreamClient>)] {
        &self.providers
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn UpstreamClient>> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| Arc::clone(c))
            .ok_or_else(|| Error::Configuration(format!("provider '{}' is not configured", name)))
    }

    /// The configured default provider, else the first registered one.
    pub fn default_client(&self) -> Option<(&str, Arc<dyn UpstreamClient>)> {
        if let Some(name) = &self.default {
            if let Some((n, c)) = self.providers.iter().find(|(n, _)| n == name) {
                return Some((n.as_str(), Arc::clone(c)));
            }
        }
        self.providers
            .first()
            .map(|(n, c)| (n.as_str(), Arc::clone(c)))
    }
}
