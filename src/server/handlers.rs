//! HTTP endpoint handlers

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;

use super::dto::{
    HealthResponse, HybridSearchBody, ImpactQuery, LearningPathQuery, PaperDetailResponse,
    ReproducibleQuery, RisingQuery, SynthesisResponse, TechniquesQuery, SEARCH_CONTROL_PARAMS,
};
use super::{ApiError, AppState, MODULE_NAME};
use crate::advisor::SynthesisRequest;
use crate::discovery::views::DEFAULT_MIN_REPRODUCIBILITY;
use crate::discovery::{DiscoveryView, ViewParams};
use crate::models::NoveltyType;
use crate::query::filters::has_code;
use crate::query::{FilterSet, QueryError, SearchRequest};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.snapshots.current();
    Json(HealthResponse {
        status: "ok".to_string(),
        module: MODULE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        snapshot_version: snapshot.version(),
        paper_count: snapshot.len(),
    })
}

/// GET /api/search/hybrid?query=...&<filters>
pub async fn hybrid_search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<HybridSearchBody>, ApiError> {
    let request = search_request(&params)?;
    let response = state.search.search(&request).await?;
    Ok(Json(response.into()))
}

/// GET /api/discovery/reproducible?min_reproducibility=N&has_code=bool&limit=N
pub async fn reproducible(
    State(state): State<AppState>,
    query: Result<Query<ReproducibleQuery>, QueryRejection>,
) -> Result<Json<DiscoveryView>, ApiError> {
    let Query(q) = query.map_err(bad_request)?;
    let params = ViewParams::Reproducible {
        min_reproducibility: q.min_reproducibility.unwrap_or(DEFAULT_MIN_REPRODUCIBILITY),
        has_code: q.has_code.unwrap_or(true),
        limit: q.limit,
    };
    Ok(Json(state.discovery.get_view(&params).await?))
}

/// GET /api/discovery/impact?min_score=N&limit=N
pub async fn impact(
    State(state): State<AppState>,
    query: Result<Query<ImpactQuery>, QueryRejection>,
) -> Result<Json<DiscoveryView>, ApiError> {
    let Query(q) = query.map_err(bad_request)?;
    let params = ViewParams::Impact {
        min_score: q.min_score.unwrap_or(0.0),
        limit: q.limit,
    };
    Ok(Json(state.discovery.get_view(&params).await?))
}

/// GET /api/discovery/rising?min_citations=N&limit=N
pub async fn rising(
    State(state): State<AppState>,
    query: Result<Query<RisingQuery>, QueryRejection>,
) -> Result<Json<DiscoveryView>, ApiError> {
    let Query(q) = query.map_err(bad_request)?;
    let params = ViewParams::Rising {
        min_citations: q.min_citations.unwrap_or(0),
        limit: q.limit,
    };
    Ok(Json(state.discovery.get_view(&params).await?))
}

/// GET /api/discovery/techniques?novelty_type=TYPE&limit=N
pub async fn techniques(
    State(state): State<AppState>,
    query: Result<Query<TechniquesQuery>, QueryRejection>,
) -> Result<Json<DiscoveryView>, ApiError> {
    let Query(q) = query.map_err(bad_request)?;
    let novelty_type = q
        .novelty_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<NoveltyType>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let params = ViewParams::Techniques {
        novelty_type,
        limit: q.limit,
    };
    Ok(Json(state.discovery.get_view(&params).await?))
}

/// GET /api/discovery/learning-path?topic=STRING&limit=N
pub async fn learning_path(
    State(state): State<AppState>,
    query: Result<Query<LearningPathQuery>, QueryRejection>,
) -> Result<Json<DiscoveryView>, ApiError> {
    let Query(q) = query.map_err(bad_request)?;
    let params = ViewParams::LearningPath {
        topic: q.topic.filter(|t| !t.trim().is_empty()),
        limit: q.limit,
    };
    Ok(Json(state.discovery.get_view(&params).await?))
}

/// GET /api/papers/:id
pub async fn paper_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaperDetailResponse>, ApiError> {
    let snapshot = state.snapshots.current();
    let paper = snapshot
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("paper '{}'", id)))?;
    Ok(Json(PaperDetailResponse {
        has_github_link: paper.has_github_link(),
        has_code: has_code(paper),
        paper: paper.clone(),
        snapshot_version: snapshot.version(),
    }))
}

/// GET /api/advisor/synthesis?query=...&<filters>
///
/// The paper list never waits on the advisor beyond its timeout.
pub async fn advisor_synthesis(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<SynthesisResponse>, ApiError> {
    let request = search_request(&params)?;
    let response = state.search.search(&request).await?;

    let mut papers = response.semantic_results;
    papers.extend(response.keyword_results);

    let outcome = state
        .advisor
        .synthesize_bounded(&SynthesisRequest {
            query: response.query.clone(),
            papers: papers.iter().map(|hit| hit.paper.clone()).collect(),
        })
        .await;

    Ok(Json(SynthesisResponse {
        query: response.query,
        papers,
        degraded: response.degraded,
        synthesis: outcome.synthesis,
        status: outcome.status,
        reason: outcome.reason,
    }))
}

/// Split raw query parameters into the query text, limits and filters.
fn search_request(params: &[(String, String)]) -> Result<SearchRequest, ApiError> {
    let mut query = None;
    let mut semantic_limit = None;
    let mut keyword_limit = None;

    for (key, value) in params {
        match key.as_str() {
            "query" | "q" => query = Some(value.clone()),
            "semantic_limit" => semantic_limit = Some(parse_limit(key, value)?),
            "keyword_limit" => keyword_limit = Some(parse_limit(key, value)?),
            _ => {}
        }
    }

    let filters = FilterSet::from_params(
        params
            .iter()
            .filter(|(key, _)| !SEARCH_CONTROL_PARAMS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value.as_str())),
    )?;
    let query =
        query.ok_or_else(|| QueryError::InvalidQuery("missing 'query' parameter".to_string()))?;

    Ok(SearchRequest {
        query,
        filters,
        semantic_limit,
        keyword_limit,
    })
}

fn parse_limit(key: &str, value: &str) -> Result<usize, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| QueryError::InvalidQuery(format!("{} must be a positive integer", key)).into())
}

fn bad_request(rejection: QueryRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}
