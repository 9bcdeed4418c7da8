//! Retrieval indexes.
//!
//! Two leaf lookups feed the query router:
//!
//! - [`KeywordIndex`]: literal term matching over title, abstract and category
//! - [`SemanticIndex`]: nearest neighbours over paper embedding vectors
//!
//! Both are built from an immutable set of papers and never mutated; a new
//! corpus state means new index values (see `discovery::snapshot`).

pub mod keyword;
pub mod semantic;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::SearchResult;

pub use keyword::{tokenize, InvertedIndex};
pub use semantic::{EmbeddingSemanticIndex, VectorStore};

/// Errors raised by an index lookup.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index cannot serve requests (no embedder, vector space mismatch, ...)
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Query embedding failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Index error: {0}")]
    Other(String),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Term-match lookup.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Papers matching at least one query term, best first, at most `limit`.
    ///
    /// Results carry `Provenance::Keyword` and a term-match score in (0, 1].
    async fn lookup(&self, query: &str, limit: usize) -> IndexResult<Vec<SearchResult>>;
}

/// Embedding-similarity lookup.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Papers whose cosine similarity to `query` is at least `min_score`,
    /// best first, at most `limit`.
    async fn nearest(
        &self,
        query: &str,
        limit: usize,
        min_score: f32,
    ) -> IndexResult<Vec<SearchResult>>;
}

/// Order hits by score descending, ties by paper id, and keep `limit`.
pub(crate) fn rank_hits(hits: &mut Vec<SearchResult>, limit: usize) {
    hits.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.paper_id.cmp(&b.paper_id))
    });
    hits.truncate(limit);
}
