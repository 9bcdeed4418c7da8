//! REST server module.
//!
//! Exposes hybrid search, the discovery views, paper detail and the
//! Research Advisor synthesis over HTTP. Handlers only translate between
//! HTTP and the library services; every request reads the score snapshot
//! that is current when it arrives.

pub mod dto;
pub mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::advisor::AdvisorGateway;
use crate::discovery::{DiscoveryError, DiscoveryViewService, SnapshotStore};
use crate::query::{HybridSearchService, QueryError};

/// Name reported by the health endpoint.
pub const MODULE_NAME: &str = "atlas-server";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotStore>,
    pub search: Arc<HybridSearchService>,
    pub discovery: Arc<DiscoveryViewService>,
    pub advisor: AdvisorGateway,
}

impl AppState {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        search: HybridSearchService,
        discovery: DiscoveryViewService,
        advisor: AdvisorGateway,
    ) -> Self {
        Self {
            snapshots,
            search: Arc::new(search),
            discovery: Arc::new(discovery),
            advisor,
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/search/hybrid", get(handlers::hybrid_search))
        .route("/api/discovery/reproducible", get(handlers::reproducible))
        .route("/api/discovery/impact", get(handlers::impact))
        .route("/api/discovery/rising", get(handlers::rising))
        .route("/api/discovery/techniques", get(handlers::techniques))
        .route("/api/discovery/learning-path", get(handlers::learning_path))
        .route("/api/papers/:id", get(handlers::paper_detail))
        .route("/api/advisor/synthesis", get(handlers::advisor_synthesis))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match self {
            ApiError::Query(QueryError::InvalidQuery(_)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_query", "message": message }),
            ),
            ApiError::Query(QueryError::UnknownFilter(name)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "unknown_filter", "message": message, "filter": name }),
            ),
            ApiError::Query(QueryError::IndexUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "index_unavailable", "message": message }),
            ),
            ApiError::Query(QueryError::SearchTimeout { timing }) => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "error": "search_timeout", "message": message, "timing": timing }),
            ),
            ApiError::Discovery(DiscoveryError::InvalidParams(_)) | ApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_params", "message": message }),
            ),
            ApiError::Discovery(DiscoveryError::IndexUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "index_unavailable", "message": message }),
            ),
            ApiError::Discovery(_) => {
                error!("Discovery request failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal", "message": message }),
                )
            }
            ApiError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": message }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
