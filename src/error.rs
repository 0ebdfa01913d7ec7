//! Error taxonomy.
//!
//! Variants map one-to-one onto the HTTP error contract: `NotFound` → 404,
//! `InvalidArgument` and `Configuration` → 400, `Upstream` and `Embedding`
//! → 502, everything else → 500.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing content or collection; surfaced to the caller, not retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad input, surfaced immediately.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Provider or network failure. Logged by the sync engine and retried
    /// on the next cycle.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Missing or inconsistent configuration for a requested capability.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Embedding API failure after retries.
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
