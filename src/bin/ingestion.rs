//! Import binary entry point.
//!
//! Loads a JSON paper dump into the SQLite Paper Store: deduplicates by
//! normalized title, keeps supplied embeddings and generates missing ones.
//!
//! # Examples
//!
//! Initialize new database:
//! ```bash
//! atlas-ingest --mode init-new --input papers.json --db-path papers.db
//! ```
//!
//! Add papers to existing database:
//! ```bash
//! atlas-ingest --input new_papers.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use paper_atlas::{
    config::{AtlasConfig, EmbeddingSettings},
    embedding::{provider_from_settings, EmbeddingProvider},
    ingestion::{ImportPipeline, IngestionStats},
    provider::{json::JsonFilePaperProvider, PaperProvider},
    storage::{sqlite::SqliteStorage, PaperStorage},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Operation mode for the import
#[derive(Debug, Clone, ValueEnum)]
enum Mode {
    /// Connect to existing database and validate embedding config (default)
    Connect,
    /// Initialize new database with fresh schema
    InitNew,
}

/// Embedding provider type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// OpenAI cloud-based embedding provider (requires OPENAI_API_KEY)
    #[value(name = "openai")]
    OpenAI,
    /// FastEmbed local embedding provider (requires the `fastembed` feature)
    #[value(name = "fastembed")]
    FastEmbed,
}

impl EmbeddingProviderType {
    fn as_str(&self) -> &'static str {
        match self {
            EmbeddingProviderType::OpenAI => "openai",
            EmbeddingProviderType::FastEmbed => "fastembed",
        }
    }
}

/// Import CLI for building and updating the Paper Store
#[derive(Parser, Debug)]
#[command(
    name = "atlas-ingest",
    version,
    about = "Load paper records into the atlas Paper Store",
    long_about = "Import pipeline for research paper records: deduplicates by title, keeps supplied embeddings, embeds the rest and stores everything in SQLite.

EXAMPLES:
  Initialize new database:
    atlas-ingest --mode init-new --input papers.json --db-path papers.db

  Add papers to existing database:
    atlas-ingest --input new_papers.json

  Use local FastEmbed embeddings:
    atlas-ingest --mode init-new --input papers.json --embedding-provider fastembed

  Custom batch size and logging:
    atlas-ingest --input papers.json --batch-size 50 --log-level debug"
)]
struct IngestionArgs {
    /// Input JSON file containing paper records
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "ATLAS_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path (overrides the config file)
    #[arg(long, value_name = "PATH", env = "ATLAS_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Operation mode: connect to existing DB or initialize new DB
    #[arg(long, value_enum, default_value = "connect")]
    mode: Mode,

    /// Embedding provider to use (overrides the config file)
    #[arg(long, value_enum)]
    embedding_provider: Option<EmbeddingProviderType>,

    /// Specific embedding model name (provider-dependent, optional)
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Number of papers to process per embedding batch
    #[arg(long, value_name = "N", default_value = "100")]
    batch_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<String>,
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

/// Merge CLI overrides into the configured embedding settings
fn embedding_settings(args: &IngestionArgs, config: &AtlasConfig) -> EmbeddingSettings {
    let mut settings = config.embedding.clone();
    if let Some(provider) = &args.embedding_provider {
        settings.provider = provider.as_str().to_string();
    }
    if args.embedding_model.is_some() {
        settings.model = args.embedding_model.clone();
    }
    if args.openai_api_key.is_some() {
        settings.api_key = args.openai_api_key.clone();
    }
    if args.cache_dir.is_some() {
        settings.cache_dir = args.cache_dir.clone();
    }
    if settings.cache_dir.is_none() {
        let default_cache = dirs::cache_dir()
            .map(|p| p.join("fastembed").to_string_lossy().to_string())
            .unwrap_or_else(|| ".cache/fastembed".to_string());
        debug!("Using default cache directory: {}", default_cache);
        settings.cache_dir = Some(default_cache);
    }
    settings
}

/// Create storage instance
async fn create_storage(db_path: &Path) -> Result<SqliteStorage> {
    debug!("Creating SQLite storage at: {:?}", db_path);

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            info!("Created database directory: {:?}", parent);
        }
    }

    let storage = SqliteStorage::open(db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    storage
        .initialize()
        .await
        .context("Failed to initialize database schema")?;
    Ok(storage)
}

/// Create the import pipeline based on mode
async fn create_pipeline(
    args: &IngestionArgs,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    storage: SqliteStorage,
) -> Result<ImportPipeline<Arc<dyn EmbeddingProvider>, SqliteStorage>> {
    let batch_size = Some(args.batch_size);

    let pipeline = match args.mode {
        Mode::Connect => {
            info!("Connecting to existing database with config validation");
            ImportPipeline::connect(embedding_provider, storage, batch_size)
                .await
                .context("Failed to connect to existing database. Use --mode init-new to create a new database.")?
        }
        Mode::InitNew => {
            info!("Initializing new database");
            ImportPipeline::initialize_new(embedding_provider, storage, batch_size)
                .await
                .context("Failed to initialize new database")?
        }
    };

    debug!("Pipeline created with batch_size={}", args.batch_size);
    Ok(pipeline)
}

/// Create a progress bar for tracking the import
fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    match ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers | Inserted: {msg}")
    {
        Ok(style) => pb.set_style(style.progress_chars("##-")),
        Err(e) => warn!("Progress bar template rejected: {}", e),
    }
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = IngestionArgs::parse();

    // Initialize logging
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting paper import");
    debug!("Input: {:?}, mode: {:?}", args.input, args.mode);

    let start_time = Instant::now();

    let config = AtlasConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Validate input file exists
    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        anyhow::bail!("Input file not found: {:?}", args.input);
    }
    info!("Input file: {:?}", args.input);

    // Create embedding provider
    let settings = embedding_settings(&args, &config);
    let embedding_provider =
        provider_from_settings(&settings, None).context("Failed to create embedding provider")?;
    info!(
        "Embedding provider initialized: model={}, dimension={}",
        embedding_provider.model_name(),
        embedding_provider.dimension()
    );

    // Create storage
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| config.storage.db_path.clone());
    let storage = create_storage(&db_path).await.context("Failed to create storage")?;
    info!("Database path: {:?}", db_path);

    // Create pipeline
    let mut pipeline = create_pipeline(&args, embedding_provider, storage)
        .await
        .context("Failed to create import pipeline")?;

    // Load paper provider
    info!("Loading papers from {:?}...", args.input);
    let provider = JsonFilePaperProvider::from_file(&args.input)
        .await
        .with_context(|| format!("Failed to load papers from {:?}", args.input))?;

    let paper_count = provider.count_papers().await?;
    info!("Found {} papers from {}", paper_count, provider.name());

    if paper_count == 0 {
        warn!("No papers found in input file");
        return Ok(());
    }

    let papers = provider.fetch_papers().await?;

    // Create progress bar
    let progress = create_progress_bar(paper_count);
    progress.set_message("0");

    // Process papers chunk by chunk so the bar tracks real progress
    info!("Processing papers with batch_size={}...", args.batch_size);
    let mut stats = IngestionStats::new();
    for chunk in papers.chunks(args.batch_size.max(1)) {
        let chunk_stats = pipeline
            .ingest_batch(chunk)
            .await
            .context("Failed to ingest papers")?;
        stats.merge(&chunk_stats);
        progress.inc(chunk.len() as u64);
        progress.set_message(stats.inserted.to_string());
    }

    progress.finish_with_message(format!("{}", stats.inserted));

    // Display final statistics
    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Import Completed                  ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Embeddings reused:    {:>16} ║", stats.embeddings_reused);
    println!("║ Embeddings generated: {:>16} ║", stats.embeddings_generated);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!(
            "{} papers failed to process - check logs for details",
            stats.failed
        );
    }

    info!("Import completed successfully");

    Ok(())
}
