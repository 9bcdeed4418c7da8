//! Query routing, filtering and result merging.
//!
//! A search fans out to the keyword and semantic indexes concurrently. Each
//! branch races its own timeout and the whole request races an outer
//! deadline. One failed branch degrades the response; it never fails it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paper_atlas::config::SearchSettings;
//! use paper_atlas::index::{EmbeddingSemanticIndex, InvertedIndex, VectorStore};
//! use paper_atlas::models::Paper;
//! use paper_atlas::query::QueryRouter;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let keyword = Arc::new(InvertedIndex::build(&Vec::<Paper>::new()));
//! let semantic = Arc::new(EmbeddingSemanticIndex::new(None, Arc::new(VectorStore::default())));
//! let router = QueryRouter::new(SearchSettings::default());
//!
//! let routed = router.route("kv cache compression", keyword, semantic).await?;
//! assert!(routed.degraded); // no query embedder configured
//! # Ok(())
//! # }
//! ```

pub mod filters;
pub mod hybrid;
pub mod merge;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::SearchSettings;
use crate::index::{IndexError, IndexResult, KeywordIndex, SemanticIndex};
use crate::models::SearchResult;

pub use filters::{AppliedFilter, Filter, FilterSet};
pub use hybrid::{HybridSearchResponse, HybridSearchService, SearchRequest};
pub use merge::{merge, Completeness, MergeLimits, MergedHit, MergedResults, PaperLookup};

/// Errors that can occur during query processing.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Empty, over-long or otherwise malformed query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A filter name outside the supported vocabulary
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// Neither branch could serve the request
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The request deadline passed, or every branch failed with at least one timeout
    #[error("Search timed out after {}ms", timing.total_ms)]
    SearchTimeout { timing: Timing },
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Per-branch and total latency. A branch that failed or timed out has no timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub semantic_ms: Option<u64>,
    pub keyword_ms: Option<u64>,
    pub total_ms: u64,
}

/// Outcome of one retrieval branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Ok,
    TimedOut,
    Failed,
}

/// Raw branch output, before filtering and merging.
#[derive(Debug, Clone)]
pub struct RoutedResults {
    pub semantic: Vec<SearchResult>,
    pub keyword: Vec<SearchResult>,
    pub timing: Timing,
    pub semantic_status: BranchStatus,
    pub keyword_status: BranchStatus,
    /// True when either branch did not contribute
    pub degraded: bool,
}

enum BranchOutcome {
    Ok(Vec<SearchResult>),
    TimedOut,
    Failed(IndexError),
}

const UNSET: u64 = u64::MAX;

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis().min(u128::from(UNSET - 1)) as u64
}

fn recorded(cell: &AtomicU64) -> Option<u64> {
    match cell.load(Ordering::Acquire) {
        UNSET => None,
        ms => Some(ms),
    }
}

/// Fans a query out to both indexes.
#[derive(Debug, Clone)]
pub struct QueryRouter {
    settings: SearchSettings,
}

impl QueryRouter {
    pub fn new(settings: SearchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Reject empty and over-long queries before any work starts.
    pub fn validate_query(&self, query: &str) -> QueryResult<()> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(QueryError::InvalidQuery("query must not be empty".to_string()));
        }
        let chars = trimmed.chars().count();
        if chars > self.settings.max_query_chars {
            return Err(QueryError::InvalidQuery(format!(
                "query is {} characters; the maximum is {}",
                chars, self.settings.max_query_chars
            )));
        }
        Ok(())
    }

    /// Run both branches concurrently and collect whatever they return in time.
    ///
    /// # Errors
    /// - `InvalidQuery` for empty or over-long queries
    /// - `SearchTimeout` when the outer deadline passes, or both branches fail
    ///   and at least one of them timed out
    /// - `IndexUnavailable` when both branches fail without a timeout
    pub async fn route(
        &self,
        query: &str,
        keyword: Arc<dyn KeywordIndex>,
        semantic: Arc<dyn SemanticIndex>,
    ) -> QueryResult<RoutedResults> {
        self.validate_query(query)?;
        let query = query.trim().to_string();
        let pool = self.settings.candidate_pool;
        let min_score = self.settings.min_semantic_relevance;

        let start = Instant::now();
        let semantic_ms = AtomicU64::new(UNSET);
        let keyword_ms = AtomicU64::new(UNSET);

        // Each lookup is its own task, so a timeout can walk away from one
        // that never yields.
        let semantic_task = {
            let query = query.clone();
            tokio::spawn(async move { semantic.nearest(&query, pool, min_score).await })
        };
        let keyword_task = tokio::spawn(async move { keyword.lookup(&query, pool).await });
        let semantic_abort = semantic_task.abort_handle();
        let keyword_abort = keyword_task.abort_handle();

        let semantic_branch = async {
            let outcome = run_branch(self.settings.semantic_timeout(), semantic_task).await;
            if matches!(outcome, BranchOutcome::Ok(_)) {
                semantic_ms.store(elapsed_ms(start), Ordering::Release);
            }
            outcome
        };
        let keyword_branch = async {
            let outcome = run_branch(self.settings.keyword_timeout(), keyword_task).await;
            if matches!(outcome, BranchOutcome::Ok(_)) {
                keyword_ms.store(elapsed_ms(start), Ordering::Release);
            }
            outcome
        };

        let joined = timeout(self.settings.request_timeout(), async {
            tokio::join!(semantic_branch, keyword_branch)
        })
        .await;

        let (semantic_outcome, keyword_outcome) = match joined {
            Ok(outcomes) => outcomes,
            Err(_) => {
                semantic_abort.abort();
                keyword_abort.abort();
                let timing = Timing {
                    semantic_ms: recorded(&semantic_ms),
                    keyword_ms: recorded(&keyword_ms),
                    total_ms: elapsed_ms(start),
                };
                warn!(total_ms = timing.total_ms, "Search exceeded request deadline");
                return Err(QueryError::SearchTimeout { timing });
            }
        };

        let mut timing = Timing {
            semantic_ms: recorded(&semantic_ms),
            keyword_ms: recorded(&keyword_ms),
            total_ms: elapsed_ms(start),
        };

        let (semantic, semantic_status, semantic_error) = split(semantic_outcome);
        let (keyword, keyword_status, keyword_error) = split(keyword_outcome);

        if semantic_status != BranchStatus::Ok && keyword_status != BranchStatus::Ok {
            timing.semantic_ms = None;
            timing.keyword_ms = None;
            if semantic_status == BranchStatus::TimedOut || keyword_status == BranchStatus::TimedOut
            {
                warn!(total_ms = timing.total_ms, "Both search branches failed with a timeout");
                return Err(QueryError::SearchTimeout { timing });
            }
            let reason = format!(
                "semantic: {}; keyword: {}",
                semantic_error.unwrap_or_default(),
                keyword_error.unwrap_or_default()
            );
            warn!("Both search branches failed: {}", reason);
            return Err(QueryError::IndexUnavailable(reason));
        }

        if let Some(reason) = &semantic_error {
            warn!("Semantic branch failed, degrading: {}", reason);
        }
        if let Some(reason) = &keyword_error {
            warn!("Keyword branch failed, degrading: {}", reason);
        }

        let degraded = semantic_status != BranchStatus::Ok || keyword_status != BranchStatus::Ok;
        info!(
            semantic_ms = ?timing.semantic_ms,
            keyword_ms = ?timing.keyword_ms,
            total_ms = timing.total_ms,
            degraded,
            "Search routed"
        );
        debug!(
            semantic_hits = semantic.len(),
            keyword_hits = keyword.len(),
            "Branch results"
        );

        Ok(RoutedResults {
            semantic,
            keyword,
            timing,
            semantic_status,
            keyword_status,
            degraded,
        })
    }
}

async fn run_branch(
    budget: Duration,
    task: JoinHandle<IndexResult<Vec<SearchResult>>>,
) -> BranchOutcome {
    let abort = task.abort_handle();
    match timeout(budget, task).await {
        Ok(Ok(Ok(hits))) => BranchOutcome::Ok(hits),
        Ok(Ok(Err(e))) => BranchOutcome::Failed(e),
        Ok(Err(e)) => {
            BranchOutcome::Failed(IndexError::Other(format!("lookup task failed: {}", e)))
        }
        Err(_) => {
            abort.abort();
            BranchOutcome::TimedOut
        }
    }
}

fn split(outcome: BranchOutcome) -> (Vec<SearchResult>, BranchStatus, Option<String>) {
    match outcome {
        BranchOutcome::Ok(hits) => (hits, BranchStatus::Ok, None),
        BranchOutcome::TimedOut => (
            Vec::new(),
            BranchStatus::TimedOut,
            Some("timed out".to_string()),
        ),
        BranchOutcome::Failed(e) => (Vec::new(), BranchStatus::Failed, Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    // ===== Mock Indexes =====

    enum Behavior {
        Hits(Vec<SearchResult>),
        Fail,
        Sleep(Duration),
        /// Holds the thread without yielding, like a long scoring loop
        Block(Duration),
    }

    struct MockKeyword(Behavior);
    struct MockSemantic(Behavior);

    async fn behave(behavior: &Behavior) -> IndexResult<Vec<SearchResult>> {
        match behavior {
            Behavior::Hits(hits) => Ok(hits.clone()),
            Behavior::Fail => Err(IndexError::Unavailable("mock down".to_string())),
            Behavior::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(Vec::new())
            }
            Behavior::Block(d) => {
                std::thread::sleep(*d);
                Ok(vec![SearchResult::keyword("late", 1.0)])
            }
        }
    }

    #[async_trait]
    impl KeywordIndex for MockKeyword {
        async fn lookup(&self, _query: &str, _limit: usize) -> IndexResult<Vec<SearchResult>> {
            behave(&self.0).await
        }
    }

    #[async_trait]
    impl SemanticIndex for MockSemantic {
        async fn nearest(
            &self,
            _query: &str,
            _limit: usize,
            _min_score: f32,
        ) -> IndexResult<Vec<SearchResult>> {
            behave(&self.0).await
        }
    }

    fn kw(behavior: Behavior) -> Arc<dyn KeywordIndex> {
        Arc::new(MockKeyword(behavior))
    }

    fn sem(behavior: Behavior) -> Arc<dyn SemanticIndex> {
        Arc::new(MockSemantic(behavior))
    }

    fn router() -> QueryRouter {
        QueryRouter::new(SearchSettings {
            semantic_timeout_ms: 200,
            keyword_timeout_ms: 100,
            request_timeout_ms: 500,
            ..SearchSettings::default()
        })
    }

    fn keyword_hits() -> Behavior {
        Behavior::Hits(vec![SearchResult::keyword("k1", 0.5)])
    }

    fn semantic_hits() -> Behavior {
        Behavior::Hits(vec![SearchResult::semantic("s1", 0.9)])
    }

    #[tokio::test]
    async fn test_rejects_empty_and_long_queries() {
        let r = router();
        assert!(matches!(
            r.route("   ", kw(keyword_hits()), sem(semantic_hits())).await,
            Err(QueryError::InvalidQuery(_))
        ));
        let long = "x".repeat(r.settings().max_query_chars + 1);
        assert!(matches!(
            r.route(&long, kw(keyword_hits()), sem(semantic_hits())).await,
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_both_branches_succeed() {
        let routed = router()
            .route("q", kw(keyword_hits()), sem(semantic_hits()))
            .await
            .unwrap();
        assert!(!routed.degraded);
        assert_eq!(routed.semantic.len(), 1);
        assert_eq!(routed.keyword.len(), 1);
        assert!(routed.timing.semantic_ms.is_some());
        assert!(routed.timing.keyword_ms.is_some());
    }

    #[tokio::test]
    async fn test_semantic_failure_degrades() {
        let routed = router()
            .route("q", kw(keyword_hits()), sem(Behavior::Fail))
            .await
            .unwrap();
        assert!(routed.degraded);
        assert_eq!(routed.semantic_status, BranchStatus::Failed);
        assert!(routed.semantic.is_empty());
        assert_eq!(routed.timing.semantic_ms, None);
        assert_eq!(routed.keyword[0].paper_id, "k1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_semantic_timeout_degrades() {
        let routed = router()
            .route(
                "q",
                kw(keyword_hits()),
                sem(Behavior::Sleep(Duration::from_secs(30))),
            )
            .await
            .unwrap();
        assert!(routed.degraded);
        assert_eq!(routed.semantic_status, BranchStatus::TimedOut);
        assert_eq!(routed.timing.semantic_ms, None);
        assert!(routed.timing.total_ms >= 200);
        assert!(routed.timing.total_ms < 500);
    }

    #[tokio::test]
    async fn test_keyword_failure_degrades() {
        let routed = router()
            .route("q", kw(Behavior::Fail), sem(semantic_hits()))
            .await
            .unwrap();
        assert!(routed.degraded);
        assert_eq!(routed.timing.keyword_ms, None);
        assert!(routed.timing.semantic_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_failing_with_timeout_is_search_timeout() {
        let err = router()
            .route(
                "q",
                kw(Behavior::Fail),
                sem(Behavior::Sleep(Duration::from_secs(30))),
            )
            .await
            .unwrap_err();
        match err {
            QueryError::SearchTimeout { timing } => {
                assert_eq!(timing.semantic_ms, None);
                assert_eq!(timing.keyword_ms, None);
                assert!(timing.total_ms >= 200);
            }
            other => panic!("expected SearchTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_both_failing_without_timeout_is_unavailable() {
        let err = router()
            .route("q", kw(Behavior::Fail), sem(Behavior::Fail))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::IndexUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_deadline_bounds_request() {
        let router = QueryRouter::new(SearchSettings {
            semantic_timeout_ms: 1_000,
            keyword_timeout_ms: 1_000,
            request_timeout_ms: 300,
            ..SearchSettings::default()
        });
        let err = router
            .route(
                "q",
                kw(keyword_hits()),
                sem(Behavior::Sleep(Duration::from_secs(30))),
            )
            .await
            .unwrap_err();
        match err {
            QueryError::SearchTimeout { timing } => {
                assert!(timing.keyword_ms.is_some());
                assert_eq!(timing.semantic_ms, None);
                assert!(timing.total_ms >= 300);
            }
            other => panic!("expected SearchTimeout, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn test_blocking_lookup_cannot_hold_request_past_timeout() {
        let router = QueryRouter::new(SearchSettings {
            semantic_timeout_ms: 50,
            keyword_timeout_ms: 50,
            request_timeout_ms: 100,
            ..SearchSettings::default()
        });
        let started = std::time::Instant::now();
        let routed = router
            .route(
                "q",
                kw(Behavior::Block(Duration::from_millis(600))),
                sem(semantic_hits()),
            )
            .await
            .unwrap();
        let waited = started.elapsed();

        assert!(waited < Duration::from_millis(400), "waited {:?}", waited);
        assert!(routed.degraded);
        assert_eq!(routed.keyword_status, BranchStatus::TimedOut);
        assert_eq!(routed.timing.keyword_ms, None);
        assert_eq!(routed.semantic[0].paper_id, "s1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_blocking_lookups_on_both_branches_time_out() {
        let router = QueryRouter::new(SearchSettings {
            semantic_timeout_ms: 50,
            keyword_timeout_ms: 50,
            request_timeout_ms: 100,
            ..SearchSettings::default()
        });
        let started = std::time::Instant::now();
        let err = router
            .route(
                "q",
                kw(Behavior::Block(Duration::from_millis(600))),
                sem(Behavior::Block(Duration::from_millis(600))),
            )
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(matches!(err, QueryError::SearchTimeout { .. }));
    }
}
