use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_api_base")]
    pub api_base: String,
    /// May be left empty in the file and supplied via CTXM_EMBEDDING_API_KEY.
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_embedding_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    /// Preferred provider for `add_content` when none is named in the call.
    #[serde(default)]
    pub default: Option<String>,
    pub outline: Option<OutlineConfig>,
    pub trilium: Option<TriliumConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutlineConfig {
    #[serde(default = "default_outline_api_base")]
    pub api_base: String,
    /// May be left empty in the file and supplied via CTXM_OUTLINE_API_KEY.
    #[serde(default)]
    pub api_key: String,
    /// Collection used by `create_document` when the caller names none.
    #[serde(default)]
    pub default_collection: Option<String>,
}

fn default_outline_api_base() -> String {
    "https://app.getoutline.com/api".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TriliumConfig {
    #[serde(default = "default_trilium_api_base")]
    pub api_base: String,
    /// May be left empty in the file and supplied via CTXM_TRILIUM_API_TOKEN.
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_trilium_parent")]
    pub parent_note_id: String,
}

fn default_trilium_api_base() -> String {
    "http://localhost:8080/etapi".to_string()
}
fn default_trilium_parent() -> String {
    "root".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
    /// Collection ids to reconcile each tick. Empty means sync the Outline
    /// default collection and the prompts collection, when configured.
    #[serde(default)]
    pub collections: Vec<String>,
    /// Collection whose documents back `load_personal_prompts`.
    #[serde(default)]
    pub prompts_collection_id: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            interval_secs: default_sync_interval(),
            collections: Vec::new(),
            prompts_collection_id: None,
        }
    }
}

fn default_sync_enabled() -> bool {
    true
}
fn default_sync_interval() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Both username and password must be set to enable HTTP basic auth.
    #[serde(default)]
    pub auth_username: Option<String>,
    #[serde(default)]
    pub auth_password: Option<String>,
}

impl ServerConfig {
    pub fn auth_enabled(&self) -> bool {
        matches!(
            (&self.auth_username, &self.auth_password),
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty()
        )
    }
}

impl OutlineConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.api_base.is_empty()
    }
}

impl TriliumConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_token.is_empty() && !self.api_base.is_empty()
    }
}

impl Config {
    /// Collections the orchestrator reconciles each tick.
    pub fn sync_collections(&self) -> Vec<String> {
        if !self.sync.collections.is_empty() {
            return self.sync.collections.clone();
        }

        let mut collections = Vec::new();
        if let Some(outline) = &self.providers.outline {
            if let Some(id) = &outline.default_collection {
                if !id.is_empty() {
                    collections.push(id.clone());
                }
            }
        }
        if let Some(id) = &self.sync.prompts_collection_id {
            if !id.is_empty() && !collections.contains(id) {
                collections.push(id.clone());
            }
        }
        collections
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Secrets may come from the environment instead of the file.
    if config.embedding.api_key.is_empty() {
        if let Ok(key) = std::env::var("CTXM_EMBEDDING_API_KEY") {
            config.embedding.api_key = key;
        }
    }
    if let Some(outline) = config.providers.outline.as_mut() {
        if outline.api_key.is_empty() {
            if let Ok(key) = std::env::var("CTXM_OUTLINE_API_KEY") {
                outline.api_key = key;
            }
        }
    }
    if let Some(trilium) = config.providers.trilium.as_mut() {
        if trilium.api_token.is_empty() {
            if let Ok(token) = std::env::var("CTXM_TRILIUM_API_TOKEN") {
                trilium.api_token = token;
            }
        }
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.model.is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }
    if config.sync.interval_secs == 0 {
        anyhow::bail!("sync.interval_secs must be >= 1");
    }
    if let Some(name) = &config.providers.default {
        match name.as_str() {
            "outline" | "trilium" => {}
            other => anyhow::bail!(
                "Unknown default provider: '{}'. Must be outline or trilium.",
                other
            ),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctxm.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_config() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "/tmp/ctxm.sqlite"

[embedding]
model = "text-embedding-3-small"
dims = 1536

[server]
bind = "127.0.0.1:8000"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.sync.interval_secs, 300);
        assert!(config.sync.enabled);
        assert!(!config.server.auth_enabled());
        assert!(config.providers.outline.is_none());
    }

    #[test]
    fn test_zero_dims_rejected() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "/tmp/ctxm.sqlite"

[embedding]
model = "text-embedding-3-small"
dims = 0

[server]
bind = "127.0.0.1:8000"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_sync_collections_fallback() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "/tmp/ctxm.sqlite"

[embedding]
model = "text-embedding-3-small"
dims = 8

[providers.outline]
api_key = "k"
default_collection = "col-a"

[sync]
prompts_collection_id = "col-b"

[server]
bind = "127.0.0.1:8000"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.sync_collections(), vec!["col-a", "col-b"]);
    }

    #[test]
    fn test_explicit_collections_win() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "/tmp/ctxm.sqlite"

[embedding]
model = "text-embedding-3-small"
dims = 8

[sync]
collections = ["x", "y"]

[server]
bind = "127.0.0.1:8000"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.sync_collections(), vec!["x", "y"]);
    }

    #[test]
    fn test_auth_requires_both_fields() {
        let (_dir, path) = write_config(
            r#"
[db]
path = "/tmp/ctxm.sqlite"

[embedding]
model = "text-embedding-3-small"
dims = 8

[server]
bind = "127.0.0.1:8000"
auth_username = "admin"
"#,
        );
        let config = load_config(&path).unwrap();
        assert!(!config.server.auth_enabled());
    }
}
