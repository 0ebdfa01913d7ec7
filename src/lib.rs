//! # Context Mirror
//!
//! A personal knowledge store that mirrors documents from upstream
//! knowledge bases (Outline, Trilium) into a local SQLite index with
//! hybrid keyword + semantic retrieval, and pushes locally authored
//! content back upstream.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Providers  │──▶│  Pull Sync   │──▶│  SQLite   │
//! │ Outline /  │   │  Engine      │   │ FTS5+Vec  │
//! │ Trilium    │◀──│  add_content │   └────┬──────┘
//! └────────────┘   └──────────────┘        │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │  (ctxm)  │       │  tools   │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Content, tag, and sync-state persistence |
//! | [`search`] | Hybrid keyword + semantic retrieval |
//! | [`embedding`] | Embedding client and vector helpers |
//! | [`upstream`] | Provider clients and registry |
//! | [`sync`] | Pull sync engine and orchestrator |
//! | [`fetch`] | Web page fetching and text extraction |
//! | [`add`] | Local-first content creation |
//! | [`tools`] | Tool registry for the HTTP API |
//! | [`server`] | HTTP tool server |

pub mod add;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod migrate;
pub mod models;
pub mod reindex;
pub mod search;
pub mod server;
pub mod store;
pub mod sync;
pub mod tools;
pub mod upstream;

pub use error::{Error, Result};
