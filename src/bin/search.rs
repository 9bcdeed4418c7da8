//! Search binary entry point.
//!
//! Command-line hybrid search over a built Paper Store. Results are shown as
//! two separate groups: "Smart Results" from the semantic branch and
//! "Additional Results" from the keyword branch. Supports single-query and
//! interactive REPL modes with table or JSON output.
//!
//! # Examples
//!
//! Single query:
//! ```bash
//! atlas-search --db-path papers.db --query "kv cache compression"
//! ```
//!
//! JSON output with filters:
//! ```bash
//! atlas-search --query "diffusion" --filter has_code=true --filter date_from=2023-01-01 --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! atlas-search --interactive
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_atlas::{
    config::AtlasConfig,
    discovery::{ScoreRecomputer, SnapshotStore},
    embedding::{provider_from_settings, EmbeddingProvider},
    models::RelevanceLevel,
    query::{
        BranchStatus, Completeness, FilterSet, HybridSearchResponse, HybridSearchService,
        MergedHit, QueryRouter, SearchRequest,
    },
    storage::{sqlite::SqliteStorage, PaperStorage},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Two human-friendly tables
    Table,
    /// The full response as JSON
    Json,
}

/// Hybrid search CLI for the paper atlas
#[derive(Parser, Debug)]
#[command(
    name = "atlas-search",
    version,
    about = "Search papers with combined keyword and semantic retrieval",
    long_about = "Query the Paper Store with hybrid search. Semantic matches are listed as \
                  \"Smart Results\" and keyword matches as \"Additional Results\".

EXAMPLES:
  Single query:
    atlas-search --db-path papers.db --query \"kv cache compression\"

  Only papers with code, as JSON:
    atlas-search --query \"diffusion\" --filter has_code=true --format json

  Interactive mode:
    atlas-search --interactive"
)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "ATLAS_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path (overrides the config file)
    #[arg(long, value_name = "PATH", env = "ATLAS_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Search query (omit with --interactive)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Filter as NAME=VALUE, repeatable (category, difficulty, has_code, date_from, ...)
    #[arg(long = "filter", value_name = "NAME=VALUE")]
    filters: Vec<String>,

    /// Maximum "Smart Results"
    #[arg(long, value_name = "N")]
    semantic_limit: Option<usize>,

    /// Maximum "Additional Results"
    #[arg(long, value_name = "N")]
    keyword_limit: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// OpenAI API key for query embeddings
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Search settings that persist across REPL commands
#[derive(Debug, Clone)]
struct Session {
    filters: Vec<(String, String)>,
    semantic_limit: Option<usize>,
    keyword_limit: Option<usize>,
    format: OutputFormat,
}

impl Session {
    fn request(&self, query: &str) -> Result<SearchRequest> {
        let filters = FilterSet::from_params(
            self.filters
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        )?;
        Ok(SearchRequest {
            query: query.to_string(),
            filters,
            semantic_limit: self.semantic_limit,
            keyword_limit: self.keyword_limit,
        })
    }

    /// Add or replace a filter; the value is checked before it is kept.
    fn set_filter(&mut self, spec: &str) -> Result<()> {
        let (key, value) = split_filter(spec)?;
        let mut candidate = self.filters.clone();
        candidate.retain(|(k, _)| k != &key);
        candidate.push((key, value));
        FilterSet::from_params(candidate.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        self.filters = candidate;
        Ok(())
    }
}

fn split_filter(spec: &str) -> Result<(String, String)> {
    let (key, value) = spec
        .split_once('=')
        .with_context(|| format!("Filter '{}' must look like NAME=VALUE", spec))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn relevance_cell(hit: &MergedHit) -> Cell {
    let (label, color) = match hit.relevance {
        Some(RelevanceLevel::Identical) => ("IDENTICAL", Color::Green),
        Some(RelevanceLevel::HighlySimilar) => ("HIGHLY_SIMILAR", Color::Cyan),
        Some(RelevanceLevel::Similar) => ("SIMILAR", Color::Yellow),
        Some(RelevanceLevel::Relevant) => ("RELEVANT", Color::White),
        None => ("KEYWORD", Color::White),
    };
    Cell::new(label).fg(color)
}

/// Render one result group as a table
fn format_group(title: &str, hits: &[MergedHit], completeness: Completeness) -> String {
    if hits.is_empty() {
        return format!("{}: none", title);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Published").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Code").add_attribute(Attribute::Bold),
    ]);

    for hit in hits {
        let published = hit
            .paper
            .published
            .date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        table.add_row(vec![
            Cell::new(hit.rank),
            Cell::new(truncate(&hit.paper.title, 60)),
            Cell::new(truncate(&hit.paper.authors.join(", "), 40)),
            Cell::new(published),
            relevance_cell(hit),
            Cell::new(format!("{:.4}", hit.relevance_score)),
            Cell::new(if hit.paper.has_github_link { "yes" } else { "" }),
        ]);
    }

    let more = match completeness {
        Completeness::Capped => " (more available)",
        Completeness::Exhausted => "",
    };
    format!("{}{}\n{}", title, more, table)
}

fn format_status(name: &str, status: BranchStatus, ms: Option<u64>) -> String {
    match (status, ms) {
        (BranchStatus::Ok, Some(ms)) => format!("{} {}ms", name, ms),
        (BranchStatus::Ok, None) => format!("{} ok", name),
        (BranchStatus::TimedOut, _) => format!("{} timed out", name),
        (BranchStatus::Failed, _) => format!("{} failed", name),
    }
}

fn format_response_table(response: &HybridSearchResponse) -> String {
    let mut out = Vec::new();
    if response.degraded {
        out.push(
            "Note: results are partial; one search branch did not respond.".to_string(),
        );
    }
    out.push(format_group(
        "Smart Results",
        &response.semantic_results,
        response.semantic_completeness,
    ));
    out.push(format_group(
        "Additional Results",
        &response.keyword_results,
        response.keyword_completeness,
    ));
    if !response.filters.is_empty() {
        let applied = response
            .filters
            .iter()
            .map(|f| format!("{}={}", f.name, f.value))
            .collect::<Vec<_>>()
            .join(", ");
        out.push(format!("Filters: {}", applied));
    }
    out.push(format!(
        "Found {} results in {}ms ({}, {}), snapshot v{}",
        response.total_results(),
        response.timing.total_ms,
        format_status("semantic", response.semantic_status, response.timing.semantic_ms),
        format_status("keyword", response.keyword_status, response.timing.keyword_ms),
        response.snapshot_version,
    ));
    out.join("\n\n")
}

fn print_response(response: &HybridSearchResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", format_response_table(response)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(response).context("Failed to serialize results to JSON")?
        ),
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  <query>             - Search for papers");
    println!("  /limit N            - Set both group limits to N");
    println!("  /limit smart N      - Set the \"Smart Results\" limit");
    println!("  /limit additional N - Set the \"Additional Results\" limit");
    println!("  /filter NAME=VALUE  - Add or replace a filter");
    println!("  /filter             - List active filters");
    println!("  /clear              - Remove all filters");
    println!("  /format table|json  - Choose the output format");
    println!("  /help               - Show this help");
    println!("  /quit, Ctrl+D       - Exit");
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok().filter(|n| *n > 0)
}

/// Apply one REPL command; returns false when the session should end.
fn handle_command(session: &mut Session, line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(command) = parts.first() else {
        return true;
    };
    match *command {
        "/help" => print_help(),
        "/quit" | "/exit" => return false,
        "/limit" => match parts.as_slice() {
            [_, n] => match parse_positive(n) {
                Some(n) => {
                    session.semantic_limit = Some(n);
                    session.keyword_limit = Some(n);
                    println!("Set both limits to {}", n);
                }
                None => eprintln!("Invalid number: must be a positive integer"),
            },
            [_, group, n] => match (*group, parse_positive(n)) {
                ("smart", Some(n)) => {
                    session.semantic_limit = Some(n);
                    println!("Set \"Smart Results\" limit to {}", n);
                }
                ("additional", Some(n)) => {
                    session.keyword_limit = Some(n);
                    println!("Set \"Additional Results\" limit to {}", n);
                }
                _ => eprintln!("Usage: /limit [smart|additional] N"),
            },
            _ => eprintln!("Usage: /limit [smart|additional] N"),
        },
        "/filter" => {
            if parts.len() == 1 {
                if session.filters.is_empty() {
                    println!("No active filters");
                }
                for (key, value) in &session.filters {
                    println!("  {}={}", key, value);
                }
            } else {
                let spec = parts[1..].join(" ");
                match session.set_filter(&spec) {
                    Ok(()) => println!("Filter set: {}", spec),
                    Err(e) => eprintln!("{:#}", e),
                }
            }
        }
        "/clear" => {
            session.filters.clear();
            println!("Cleared all filters");
        }
        "/format" => match parts.get(1).copied() {
            Some("table") => {
                session.format = OutputFormat::Table;
                println!("Set output format to table");
            }
            Some("json") => {
                session.format = OutputFormat::Json;
                println!("Set output format to JSON");
            }
            _ => eprintln!("Usage: /format [table|json]"),
        },
        other => eprintln!("Unknown command: {}. Type /help for available commands.", other),
    }
    true
}

async fn run_query(service: &HybridSearchService, session: &Session, query: &str) -> Result<()> {
    debug!("Executing search for query: {}", query);
    let request = session.request(query)?;
    let response = service
        .search(&request)
        .await
        .with_context(|| format!("Search failed for query '{}'", query))?;
    print_response(&response, session.format)
}

/// Run interactive REPL mode
async fn run_interactive(service: HybridSearchService, mut session: Session) -> Result<()> {
    println!("Interactive Paper Atlas Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    loop {
        match rl.readline("atlas> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    if !handle_command(&mut session, line) {
                        break;
                    }
                } else if let Err(e) = run_query(&service, &session, line).await {
                    eprintln!("{:#}", e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    if !args.interactive && args.query.is_none() {
        anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    let mut config =
        AtlasConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db_path) = &args.db_path {
        config.storage.db_path = db_path.clone();
    }
    if args.openai_api_key.is_some() {
        config.embedding.api_key = args.openai_api_key.clone();
    }
    config.validate().context("Invalid configuration")?;

    let db_path = config.storage.db_path.clone();
    if !db_path.exists() {
        anyhow::bail!(
            "Database file not found: {}\n\
             Please run atlas-ingest first to create the database.",
            db_path.display()
        );
    }

    info!("Loading database from: {}", db_path.display());
    let storage = SqliteStorage::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    storage
        .initialize()
        .await
        .context("Failed to initialize storage")?;

    let paper_count = storage
        .count_papers()
        .await
        .context("Failed to count papers in database")?;
    if paper_count == 0 {
        anyhow::bail!(
            "Database is empty (0 papers found).\n\
             Please run atlas-ingest to add papers first."
        );
    }
    info!("Database contains {} papers", paper_count);

    let stored_config = storage
        .get_config()
        .await
        .context("Failed to read embedding configuration")?;
    let embedder: Option<Arc<dyn EmbeddingProvider>> =
        match provider_from_settings(&config.embedding, stored_config.as_ref()) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!("Semantic search disabled, showing keyword results only: {}", e);
                None
            }
        };

    let snapshots = Arc::new(SnapshotStore::default());
    ScoreRecomputer::new(Arc::new(storage), Arc::clone(&snapshots))
        .recompute(chrono::Utc::now())
        .await
        .context("Failed to score papers")?;

    let service = HybridSearchService::new(snapshots, embedder, QueryRouter::new(config.search));

    let mut session = Session {
        filters: Vec::new(),
        semantic_limit: args.semantic_limit,
        keyword_limit: args.keyword_limit,
        format: args.format,
    };
    for spec in &args.filters {
        session.set_filter(spec)?;
    }

    match args.query {
        Some(query) => run_query(&service, &session, &query).await,
        None => run_interactive(service, session).await,
    }
}
