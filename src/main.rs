//! # Context Mirror CLI (`ctxm`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxm init` | Create the SQLite database and run schema migrations |
//! | `ctxm serve` | Start the HTTP tool server (with background sync) |
//! | `ctxm sync [collection]` | Run one pull cycle now |
//! | `ctxm search "<query>"` | Hybrid search over stored content |
//! | `ctxm get <id>` | Print one content item with its tags |
//! | `ctxm add <title>` | Store content and push it upstream |
//! | `ctxm fetch <url>` | Fetch a web page and store its text |
//! | `ctxm sources` | Count content per source type |
//! | `ctxm status` | Per-collection sync state |
//! | `ctxm history` | Recent sync log entries |
//! | `ctxm reindex` | Regenerate missing or mismatched vectors |

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use context_mirror::add::{self, AddRequest};
use context_mirror::config::{self, Config};
use context_mirror::db;
use context_mirror::embedding::{Embedder, HttpEmbedder};
use context_mirror::migrate;
use context_mirror::reindex;
use context_mirror::search;
use context_mirror::server;
use context_mirror::store::Store;
use context_mirror::sync::{pull_collection, SyncOrchestrator};
use context_mirror::tools::ToolContext;
use context_mirror::upstream::ProviderRegistry;

/// Context Mirror — a personal knowledge store with hybrid retrieval and
/// incremental upstream sync.
#[derive(Parser)]
#[command(
    name = "ctxm",
    about = "Context Mirror — personal knowledge store with hybrid search and upstream sync",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ctxm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Start the HTTP tool server, with the background sync loop when
    /// sync is enabled.
    Serve,

    /// Run one pull cycle for a collection (or all configured ones) and
    /// exit.
    Sync {
        /// Collection id. Defaults to every configured collection.
        collection: Option<String>,
    },

    /// Hybrid keyword + semantic search.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Filter results to one source type (e.g. `outline`, `web`).
        #[arg(long)]
        source: Option<String>,
    },

    /// Print a content item with its tags.
    Get {
        /// Content id.
        id: String,
    },

    /// Store a content item locally and push it upstream.
    ///
    /// Body text is read from --content, or from stdin when omitted.
    Add {
        /// Title for the new item.
        title: String,

        /// Body text. Reads stdin when not given.
        #[arg(long)]
        content: Option<String>,

        /// Upstream provider name (default provider when omitted).
        #[arg(long)]
        provider: Option<String>,

        /// Tags to attach.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Upstream collection id.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Fetch a web page, extract its text, and store it.
    Fetch {
        /// URL to fetch.
        url: String,

        /// Tags to attach.
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Upstream collection id.
        #[arg(long)]
        collection: Option<String>,
    },

    /// Count stored content per source type.
    Sources,

    /// Per-collection sync state.
    Status,

    /// Recent sync log entries, newest first.
    History {
        /// Maximum number of entries.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Drop vectors from other models and embed content missing one.
    Reindex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "context_mirror=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            run_serve(cfg).await?;
        }
        Commands::Sync { collection } => {
            run_sync(&cfg, collection).await?;
        }
        Commands::Search {
            query,
            limit,
            source,
        } => {
            let (store, embedder) = open_store(&cfg).await?;
            let source_types: Vec<String> = source.into_iter().collect();
            let results =
                search::hybrid_search(&store, embedder.as_ref(), &query, limit, &source_types)
                    .await?;

            if results.is_empty() {
                println!("No results.");
            }
            for (i, r) in results.iter().enumerate() {
                println!("{}. [{:.3}] {} ({})", i + 1, r.score, r.title, r.source_type);
                if let Some(url) = &r.source_url {
                    println!("    url: {}", url);
                }
                println!("    excerpt: {}", r.content.replace('\n', " ").trim());
                println!("    id: {}", r.id);
                println!();
            }
        }
        Commands::Get { id } => {
            let store = open_store_readonly(&cfg).await?;
            let item = store.get_with_tags(&id).await?;
            println!("id:          {}", item.item.id);
            println!("title:       {}", item.item.title);
            println!("source_type: {}", item.item.source_type);
            if let Some(url) = &item.item.source_url {
                println!("source_url:  {}", url);
            }
            if let Some(collection) = &item.item.collection_id {
                println!("collection:  {}", collection);
            }
            if let Some(doc) = &item.item.upstream_doc_id {
                println!("upstream:    {}", doc);
            }
            if !item.tags.is_empty() {
                println!("tags:        {}", item.tags.join(", "));
            }
            println!();
            println!("{}", item.item.body);
        }
        Commands::Add {
            title,
            content,
            provider,
            tags,
            collection,
        } => {
            let body = match content {
                Some(body) => body,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };

            let (store, embedder) = open_store(&cfg).await?;
            let registry = ProviderRegistry::from_config(&cfg)?;
            let id = add::add_content(
                &store,
                &registry,
                embedder.as_ref(),
                AddRequest {
                    title,
                    body,
                    provider,
                    source_type: None,
                    tags,
                    collection_id: collection,
                    source_url: None,
                    metadata: None,
                },
            )
            .await?;
            println!("Created content {}", id);
        }
        Commands::Fetch {
            url,
            tags,
            collection,
        } => {
            let (store, embedder) = open_store(&cfg).await?;
            let registry = ProviderRegistry::from_config(&cfg)?;
            let id =
                add::fetch_url(&store, &registry, embedder.as_ref(), &url, None, tags, collection)
                    .await?;
            println!("Created content {}", id);
        }
        Commands::Sources => {
            let store = open_store_readonly(&cfg).await?;
            let sources = store.list_by_source().await?;
            if sources.is_empty() {
                println!("No content stored.");
            }
            for s in sources {
                println!("{:>6}  {}", s.count, s.source_type);
            }
        }
        Commands::Status => {
            let store = open_store_readonly(&cfg).await?;
            let states = store.sync_states().await?;
            if states.is_empty() {
                println!("No collections synced yet.");
            }
            for s in states {
                let cursor = s
                    .last_pull_at
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());
                print!(
                    "{}  {}  last pull: {}",
                    s.collection_id,
                    s.status.as_str(),
                    cursor
                );
                if let Some(err) = &s.error_message {
                    print!("  error: {}", err);
                }
                println!();
            }
        }
        Commands::History { limit } => {
            let store = open_store_readonly(&cfg).await?;
            let entries = store.sync_history(limit).await?;
            if entries.is_empty() {
                println!("No sync history.");
            }
            for e in entries {
                let when = chrono::DateTime::from_timestamp(e.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                print!("{}  {:7}", when, e.operation);
                if let Some(c) = &e.collection_id {
                    print!("  collection={}", c);
                }
                if let Some(d) = &e.upstream_doc_id {
                    print!("  doc={}", d);
                }
                if let Some(detail) = &e.detail {
                    print!("  {}", detail);
                }
                println!();
            }
        }
        Commands::Reindex => {
            let (store, embedder) = open_store(&cfg).await?;
            let stats = reindex::reindex(&store, embedder.as_ref()).await?;
            println!(
                "Reindex complete: {} deleted, {} embedded, {} failed",
                stats.deleted, stats.embedded, stats.failed
            );
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> anyhow::Result<(Store, Arc<dyn Embedder>)> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&cfg.embedding)?);
    Ok((Store::new(pool), embedder))
}

async fn open_store_readonly(cfg: &Config) -> anyhow::Result<Store> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Store::new(pool))
}

async fn run_sync(cfg: &Config, collection: Option<String>) -> anyhow::Result<()> {
    let (store, embedder) = open_store(cfg).await?;
    let registry = ProviderRegistry::from_config(cfg)?;

    if registry.is_empty() {
        anyhow::bail!("no upstream provider configured");
    }

    let targets = match collection {
        Some(id) => vec![id],
        None => cfg.sync_collections(),
    };
    if targets.is_empty() {
        anyhow::bail!("no collections configured; set [sync].collections");
    }

    for collection_id in targets {
        if !store.claim_collection(&collection_id).await? {
            println!("{}: already syncing, skipped", collection_id);
            continue;
        }

        let last_pull_at = store
            .sync_state(&collection_id)
            .await?
            .and_then(|s| s.last_pull_at);

        // Every registered provider gets a pass over the collection; one
        // failing does not stop the others.
        let mut newest_seen: Option<i64> = None;
        let mut succeeded = false;
        let mut last_error: Option<String> = None;

        for (provider, client) in registry.clients() {
            match pull_collection(
                &store,
                client.as_ref(),
                embedder.as_ref(),
                &collection_id,
                last_pull_at,
            )
            .await
            {
                Ok(stats) => {
                    succeeded = true;
                    newest_seen = match (newest_seen, stats.newest_seen) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        (a, b) => a.or(b),
                    };
                    println!(
                        "{} ({}): {} created, {} updated, {} skipped, {} errors",
                        collection_id, provider, stats.created, stats.updated, stats.skipped,
                        stats.errors
                    );
                }
                Err(err) => {
                    last_error = Some(err.to_string());
                    eprintln!("{} ({}): sync failed: {}", collection_id, provider, err);
                }
            }
        }

        if succeeded {
            let cursor = match (newest_seen, last_pull_at) {
                (Some(seen), Some(prev)) => Some(seen.max(prev)),
                (seen, prev) => seen.or(prev),
            };
            store.finish_collection(&collection_id, cursor, None).await?;
        } else {
            store
                .finish_collection(&collection_id, None, last_error.as_deref())
                .await?;
        }
    }
    Ok(())
}

async fn run_serve(cfg: Config) -> anyhow::Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store = Store::new(pool);

    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(&cfg.embedding)?);
    let registry = Arc::new(ProviderRegistry::from_config(&cfg)?);
    let config = Arc::new(cfg);

    let orchestrator = Arc::new(SyncOrchestrator::new(
        store.clone(),
        Arc::clone(&registry),
        Arc::clone(&embedder),
        config.sync_collections(),
        Duration::from_secs(config.sync.interval_secs),
    ));

    if config.sync.enabled && !registry.is_empty() {
        orchestrator.start().await?;
    }

    let ctx = Arc::new(ToolContext {
        store,
        registry,
        embedder,
        orchestrator: Arc::clone(&orchestrator),
        config,
    });

    let result = server::run_server(ctx).await;
    orchestrator.shutdown().await;
    result
}
