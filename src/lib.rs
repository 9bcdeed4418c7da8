//! Paper Atlas - hybrid retrieval and discovery ranking for research papers.
//!
//! This library provides the search and discovery core of the paper atlas:
//! a query is answered by a keyword index and a semantic index in parallel,
//! and the two result sets are kept apart as "Smart Results" (semantic) and
//! "Additional Results" (keyword). Alongside search, a background scorer
//! derives citation velocity, reproducibility, novelty, impact and
//! difficulty for every paper and serves ranked discovery views from them.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, PublishedDate, PaperScores, SearchResult, etc.)
//! - **embedding**: Query and ingestion embeddings, text normalization
//! - **storage**: Paper Store persistence (SQLite and in-memory)
//! - **provider**: Paper sources for ingestion (JSON dumps)
//! - **ingestion**: Offline import pipeline
//! - **index**: Keyword and semantic indexes
//! - **query**: Query routing, filters, result merging, hybrid search
//! - **discovery**: Scoring, versioned snapshots, ranked views, learning paths
//! - **cache**: Discovery view memoization
//! - **advisor**: Research Advisor synthesis with a bounded timeout
//! - **server**: REST surface (axum)
//! - **config**: TOML configuration
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Load paper records from a JSON dump
//! 2. Normalize titles for deduplication
//! 3. Keep supplied embeddings, generate missing ones
//! 4. Store papers in the SQLite Paper Store
//!
//! ## Online Service
//!
//! 1. Score the corpus and publish a snapshot (repeated on a schedule)
//! 2. Route each query to both indexes under per-branch timeouts
//! 3. Filter, deduplicate and rank each group independently
//! 4. Flag the response as degraded when a branch did not contribute
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use paper_atlas::{
//!     config::SearchSettings,
//!     discovery::{ScoreRecomputer, SnapshotStore},
//!     query::{HybridSearchService, QueryRouter, SearchRequest},
//!     storage::sqlite::SqliteStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(SqliteStorage::open("papers.db")?);
//!     let snapshots = Arc::new(SnapshotStore::default());
//!     ScoreRecomputer::new(storage, Arc::clone(&snapshots))
//!         .recompute(chrono::Utc::now())
//!         .await?;
//!
//!     let search = HybridSearchService::new(
//!         snapshots,
//!         None,
//!         QueryRouter::new(SearchSettings::default()),
//!     );
//!     let response = search.search(&SearchRequest::new("kv cache compression")).await?;
//!     for hit in &response.keyword_results {
//!         println!("{}: {}", hit.paper.title, hit.relevance_score);
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod advisor;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod embedding;
pub mod index;
pub mod ingestion;
pub mod models;
pub mod provider;
pub mod query;
pub mod server;
pub mod storage;

// Re-export commonly used types at the crate root
pub use config::AtlasConfig;
pub use discovery::{DiscoveryViewService, ScoreRecomputer, ScoreSnapshot, SnapshotStore};
pub use embedding::EmbeddingProvider;
pub use models::{Author, EmbeddingConfig, Paper, PublishedDate, RelevanceLevel, SearchResult};
pub use query::{HybridSearchService, QueryRouter, SearchRequest};
pub use storage::PaperStorage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
