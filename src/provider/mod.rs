//! Sources of paper records for the import pipeline.
//!
//! A provider hands over records as parsed [`Paper`] values. It does not
//! deduplicate, embed or score; those happen downstream in `ingestion` and
//! `discovery`. Records may or may not carry an embedding vector, and
//! publication dates that fail to parse arrive as `PublishedDate::DateUnknown`.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

pub mod json;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to read paper source: {0}")]
    Io(#[from] std::io::Error),

    /// The source was readable but is not a paper dump
    #[error("Malformed paper dump: {0}")]
    Malformed(String),

    #[error("Provider error: {0}")]
    Other(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Every record the source holds, in source order.
    async fn fetch_papers(&self) -> ProviderResult<Vec<Paper>>;

    /// Number of records; the default fetches everything and counts.
    async fn count_papers(&self) -> ProviderResult<usize> {
        Ok(self.fetch_papers().await?.len())
    }

    /// Label used in logs and the import summary.
    fn name(&self) -> &str;
}
