//! Paper Store abstraction and implementations.
//!
//! This module defines the interface for persisting and retrieving paper
//! metadata, embeddings and derived discovery scores. Ingestion writes papers;
//! the search core only reads them and writes back derived scores. Papers are
//! never deleted through this interface.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EmbeddingConfig, Paper, PaperScores};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate entry (same id or normalized title already exists)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Derived scores for one paper, as written back by the recompute cycle.
#[derive(Debug, Clone)]
pub struct ScoreUpdate {
    pub paper_id: String,
    pub scores: PaperScores,
}

/// Trait for Paper Store backends.
///
/// Implementations use interior mutability so one store can be shared between
/// request handlers and the background recompute task.
#[async_trait]
pub trait PaperStorage: Send + Sync {
    /// Initialize the storage (create tables, indexes, etc.).
    ///
    /// This should be idempotent and safe to call multiple times.
    async fn initialize(&self) -> StorageResult<()>;

    /// Persist the embedding configuration the stored vectors were made with.
    async fn store_config(&self, config: &EmbeddingConfig) -> StorageResult<()>;

    /// Retrieve the embedding configuration, or None if not set.
    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>>;

    /// Insert a new paper.
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateEntry` if a paper with the same id or
    /// normalized title already exists
    async fn insert_paper(&self, paper: &Paper) -> StorageResult<()>;

    /// Check if a paper with the given normalized title exists.
    ///
    /// This is used for deduplication during ingestion.
    async fn exists_by_title(&self, normalized_title: &str) -> StorageResult<bool>;

    /// Retrieve every paper, including embeddings and last derived scores.
    async fn get_all_papers(&self) -> StorageResult<Vec<Paper>>;

    /// Get a paper by its id.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the paper doesn't exist
    async fn get_paper_by_id(&self, id: &str) -> StorageResult<Paper>;

    /// Get the total count of papers in storage.
    async fn count_papers(&self) -> StorageResult<usize>;

    /// Overwrite derived scores. Unknown ids are skipped; returns how many
    /// papers were updated.
    async fn update_scores(&self, updates: &[ScoreUpdate]) -> StorageResult<usize>;
}
