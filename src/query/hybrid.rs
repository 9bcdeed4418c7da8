//! Hybrid search over the current score snapshot.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use super::filters::{AppliedFilter, FilterSet};
use super::merge::{merge, Completeness, MergeLimits, MergedHit};
use super::{BranchStatus, QueryError, QueryResult, QueryRouter, Timing};
use crate::discovery::SnapshotStore;
use crate::embedding::EmbeddingProvider;
use crate::index::EmbeddingSemanticIndex;

/// One hybrid search request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub filters: FilterSet,
    /// Overrides the configured "Smart Results" limit
    pub semantic_limit: Option<usize>,
    /// Overrides the configured "Additional Results" limit
    pub keyword_limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }
}

/// Two ranked groups plus everything a caller needs to interpret them.
#[derive(Debug, Clone, Serialize)]
pub struct HybridSearchResponse {
    pub query: String,
    /// "Smart Results": semantic matches
    pub semantic_results: Vec<MergedHit>,
    /// "Additional Results": keyword matches not already in the semantic group
    pub keyword_results: Vec<MergedHit>,
    pub timing: Timing,
    pub degraded: bool,
    pub semantic_status: BranchStatus,
    pub keyword_status: BranchStatus,
    pub filters: Vec<AppliedFilter>,
    pub semantic_completeness: Completeness,
    pub keyword_completeness: Completeness,
    pub semantic_limit: usize,
    pub keyword_limit: usize,
    pub snapshot_version: u64,
}

impl HybridSearchResponse {
    pub fn total_results(&self) -> usize {
        self.semantic_results.len() + self.keyword_results.len()
    }
}

/// Runs hybrid searches against whatever snapshot is current.
#[derive(Clone)]
pub struct HybridSearchService {
    snapshots: Arc<SnapshotStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    router: QueryRouter,
}

impl HybridSearchService {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        router: QueryRouter,
    ) -> Self {
        Self {
            snapshots,
            embedder,
            router,
        }
    }

    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    /// Group limits for `request`; overrides must lie in `1..=candidate_pool`.
    fn limits(&self, request: &SearchRequest) -> QueryResult<MergeLimits> {
        let settings = self.router.settings();
        let check = |name: &str, value: Option<usize>, default: usize| match value {
            None => Ok(default),
            Some(v) if v >= 1 && v <= settings.candidate_pool => Ok(v),
            Some(v) => Err(QueryError::InvalidQuery(format!(
                "{} must lie in 1..={}, got {}",
                name, settings.candidate_pool, v
            ))),
        };
        Ok(MergeLimits {
            semantic_limit: check("semantic_limit", request.semantic_limit, settings.semantic_limit)?,
            keyword_limit: check("keyword_limit", request.keyword_limit, settings.keyword_limit)?,
            candidate_pool: settings.candidate_pool,
        })
    }

    /// Search both branches, filter and merge.
    ///
    /// The snapshot is read once, so indexes, scores and filters all see
    /// the same corpus state even if a recompute publishes mid-request.
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn search(&self, request: &SearchRequest) -> QueryResult<HybridSearchResponse> {
        self.router.validate_query(&request.query)?;
        let limits = self.limits(request)?;
        let snapshot = self.snapshots.current();
        let keyword = snapshot.keyword_index();
        let semantic = Arc::new(EmbeddingSemanticIndex::new(
            self.embedder.clone(),
            snapshot.vectors(),
        ));

        let routed = self.router.route(&request.query, keyword, semantic).await?;

        let merged = merge(
            routed.semantic,
            routed.keyword,
            &request.filters,
            &*snapshot,
            limits,
        );
        debug!(
            smart = merged.semantic.len(),
            additional = merged.keyword.len(),
            snapshot_version = snapshot.version(),
            "Merged search results"
        );

        Ok(HybridSearchResponse {
            query: request.query.trim().to_string(),
            semantic_results: merged.semantic,
            keyword_results: merged.keyword,
            timing: routed.timing,
            degraded: routed.degraded,
            semantic_status: routed.semantic_status,
            keyword_status: routed.keyword_status,
            filters: request.filters.describe(),
            semantic_completeness: merged.semantic_completeness,
            keyword_completeness: merged.keyword_completeness,
            semantic_limit: limits.semantic_limit,
            keyword_limit: limits.keyword_limit,
            snapshot_version: snapshot.version(),
        })
    }
}
