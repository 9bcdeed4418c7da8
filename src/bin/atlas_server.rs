//! REST server binary entry point.
//!
//! Opens the Paper Store, publishes an initial score snapshot, keeps
//! rescoring in the background and serves search and discovery over HTTP.
//!
//! # Examples
//!
//! ```bash
//! OPENAI_API_KEY=sk-... atlas-server --db-path papers.db --port 8600
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use paper_atlas::{
    advisor::AdvisorGateway,
    config::AtlasConfig,
    discovery::{DiscoveryViewService, ScoreRecomputer, SnapshotStore},
    embedding::{provider_from_settings, EmbeddingProvider},
    query::{HybridSearchService, QueryRouter},
    server::{build_router, AppState},
    storage::{sqlite::SqliteStorage, PaperStorage},
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Paper atlas REST server
#[derive(Parser, Debug)]
#[command(
    name = "atlas-server",
    version,
    about = "Serve hybrid paper search and discovery views over HTTP"
)]
struct ServerArgs {
    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "ATLAS_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path (overrides the config file)
    #[arg(long, value_name = "PATH", env = "ATLAS_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Bind address (overrides the config file)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port (overrides the config file)
    #[arg(long, value_name = "PORT", env = "ATLAS_PORT")]
    port: Option<u16>,

    /// OpenAI API key for query embeddings
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Research Advisor synthesis endpoint (overrides the config file)
    #[arg(long, value_name = "URL", env = "ATLAS_ADVISOR_URL")]
    advisor_url: Option<String>,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn apply_overrides(args: &ServerArgs, mut config: AtlasConfig) -> AtlasConfig {
    if let Some(db_path) = &args.db_path {
        config.storage.db_path = db_path.clone();
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.openai_api_key.is_some() {
        config.embedding.api_key = args.openai_api_key.clone();
    }
    if args.advisor_url.is_some() {
        config.advisor.endpoint = args.advisor_url.clone();
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    let config = apply_overrides(
        &args,
        AtlasConfig::load(args.config.as_deref()).context("Failed to load configuration")?,
    );
    config.validate().context("Invalid configuration")?;

    info!("Opening Paper Store at {:?}", config.storage.db_path);
    let storage = SqliteStorage::open(&config.storage.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.storage.db_path))?;
    storage
        .initialize()
        .await
        .context("Failed to initialize database schema")?;
    let stored_config = storage
        .get_config()
        .await
        .context("Failed to read embedding configuration")?;

    // Without a query embedder search degrades to keyword-only results
    let embedder: Option<Arc<dyn EmbeddingProvider>> =
        match provider_from_settings(&config.embedding, stored_config.as_ref()) {
            Ok(provider) => {
                info!(
                    "Query embeddings: model={}, dimension={}",
                    provider.model_name(),
                    provider.dimension()
                );
                Some(provider)
            }
            Err(e) => {
                warn!("Semantic search disabled: {}", e);
                None
            }
        };

    let snapshots = Arc::new(SnapshotStore::default());
    let recomputer = Arc::new(ScoreRecomputer::new(Arc::new(storage), Arc::clone(&snapshots)));
    let report = recomputer
        .recompute(chrono::Utc::now())
        .await
        .context("Initial score computation failed")?;
    info!(
        "Initial snapshot v{} with {} papers",
        report.version, report.papers
    );
    let recompute_task = Arc::clone(&recomputer).spawn(config.discovery.recompute_interval());

    let search = HybridSearchService::new(
        Arc::clone(&snapshots),
        embedder.clone(),
        QueryRouter::new(config.search.clone()),
    );
    let discovery =
        DiscoveryViewService::new(Arc::clone(&snapshots), embedder, config.discovery.clone());
    let advisor = AdvisorGateway::from_settings(&config.advisor);
    if !advisor.is_enabled() {
        info!("No Research Advisor configured; synthesis will report unavailable");
    }

    let app = build_router(AppState::new(snapshots, search, discovery, advisor));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("atlas-server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    recompute_task.abort();
    Ok(())
}
