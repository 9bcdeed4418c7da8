//! Request and response payloads for the REST surface.

use serde::{Deserialize, Serialize};

use crate::advisor::{Synthesis, SynthesisStatus};
use crate::models::Paper;
use crate::query::{
    AppliedFilter, BranchStatus, Completeness, HybridSearchResponse, MergedHit, Timing,
};

/// Parameters of `/api/search/hybrid` that are not filters.
pub const SEARCH_CONTROL_PARAMS: &[&str] = &["query", "q", "semantic_limit", "keyword_limit"];

/// Body of `GET /api/search/hybrid`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchBody {
    pub query: String,
    pub semantic_results: Vec<MergedHit>,
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

impl From<HybridSearchResponse> for HybridSearchBody {
    fn from(r: HybridSearchResponse) -> Self {
        Self {
            query: r.query,
            semantic_results: r.semantic_results,
            keyword_results: r.keyword_results,
            timing: r.timing,
            degraded: r.degraded,
            semantic_status: r.semantic_status,
            keyword_status: r.keyword_status,
            filters: r.filters,
            semantic_completeness: r.semantic_completeness,
            keyword_completeness: r.keyword_completeness,
            semantic_limit: r.semantic_limit,
            keyword_limit: r.keyword_limit,
            snapshot_version: r.snapshot_version,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReproducibleQuery {
    pub min_reproducibility: Option<f64>,
    pub has_code: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImpactQuery {
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RisingQuery {
    pub min_citations: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechniquesQuery {
    pub novelty_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LearningPathQuery {
    pub topic: Option<String>,
    pub limit: Option<usize>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub snapshot_version: u64,
    pub paper_count: usize,
}

/// A paper with its derived scores and their explanations.
#[derive(Debug, Serialize)]
pub struct PaperDetailResponse {
    pub paper: Paper,
    pub has_github_link: bool,
    /// The `has_code` search filter outcome; `None` while unscored
    pub has_code: Option<bool>,
    pub snapshot_version: u64,
}

/// Paper list plus an optional advisor synthesis.
#[derive(Debug, Serialize)]
pub struct SynthesisResponse {
    pub query: String,
    pub papers: Vec<MergedHit>,
    pub degraded: bool,
    pub synthesis: Option<Synthesis>,
    pub status: SynthesisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
