//! Research Advisor integration.
//!
//! The advisor is an external synthesis service that summarizes a set of
//! papers for a question. The core never depends on it: every call goes
//! through [`AdvisorGateway`], which bounds it with a timeout and turns any
//! absence, error or timeout into `synthesis: None` with a
//! `synthesis_unavailable` status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::AdvisorSettings;
use crate::models::PaperSummary;

/// Errors that can occur when calling the advisor.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("Advisor request failed: {0}")]
    RequestError(String),

    #[error("Advisor returned an unusable response: {0}")]
    ResponseError(String),

    #[error("Advisor configuration error: {0}")]
    ConfigError(String),
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// What the advisor is asked about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub query: String,
    pub papers: Vec<PaperSummary>,
}

/// Advisor output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub summary: String,
    /// Ids of papers the summary draws on
    #[serde(default)]
    pub cited_paper_ids: Vec<String>,
}

#[async_trait]
pub trait ResearchAdvisor: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> AdvisorResult<Synthesis>;
}

/// Advisor reached over HTTP: POSTs the request as JSON, expects a [`Synthesis`] back.
#[derive(Debug, Clone)]
pub struct HttpResearchAdvisor {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpResearchAdvisor {
    pub fn new(endpoint: impl Into<String>) -> AdvisorResult<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(AdvisorError::ConfigError(format!(
                "endpoint must be an http(s) URL: '{}'",
                endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AdvisorError::ConfigError(e.to_string()))?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl ResearchAdvisor for HttpResearchAdvisor {
    async fn synthesize(&self, request: &SynthesisRequest) -> AdvisorResult<Synthesis> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AdvisorError::RequestError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::RequestError(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AdvisorError::ResponseError(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStatus {
    Ok,
    SynthesisUnavailable,
}

/// Result of a bounded advisor call; never an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisOutcome {
    pub synthesis: Option<Synthesis>,
    pub status: SynthesisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SynthesisOutcome {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            synthesis: None,
            status: SynthesisStatus::SynthesisUnavailable,
            reason: Some(reason.into()),
        }
    }
}

/// Optional advisor plus the time it is allowed to take.
#[derive(Clone)]
pub struct AdvisorGateway {
    advisor: Option<Arc<dyn ResearchAdvisor>>,
    timeout: Duration,
}

impl AdvisorGateway {
    pub fn new(advisor: Option<Arc<dyn ResearchAdvisor>>, timeout: Duration) -> Self {
        Self { advisor, timeout }
    }

    /// Gateway with no advisor; every call reports `synthesis_unavailable`.
    pub fn disabled() -> Self {
        Self::new(None, Duration::from_millis(0))
    }

    /// Build from settings; an invalid endpoint disables the advisor with a warning.
    pub fn from_settings(settings: &AdvisorSettings) -> Self {
        let advisor = settings.endpoint.as_deref().and_then(|endpoint| {
            match HttpResearchAdvisor::new(endpoint) {
                Ok(advisor) => Some(Arc::new(advisor) as Arc<dyn ResearchAdvisor>),
                Err(e) => {
                    warn!("Research advisor disabled: {}", e);
                    None
                }
            }
        });
        Self::new(advisor, settings.timeout())
    }

    pub fn is_enabled(&self) -> bool {
        self.advisor.is_some()
    }

    pub async fn synthesize_bounded(&self, request: &SynthesisRequest) -> SynthesisOutcome {
        let Some(advisor) = &self.advisor else {
            return SynthesisOutcome::unavailable("no research advisor configured");
        };

        match timeout(self.timeout, advisor.synthesize(request)).await {
            Ok(Ok(synthesis)) => {
                debug!(query = %request.query, "Advisor synthesis received");
                SynthesisOutcome {
                    synthesis: Some(synthesis),
                    status: SynthesisStatus::Ok,
                    reason: None,
                }
            }
            Ok(Err(e)) => {
                warn!("Research advisor failed: {}", e);
                SynthesisOutcome::unavailable(e.to_string())
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Research advisor timed out");
                SynthesisOutcome::unavailable(format!(
                    "advisor did not answer within {}ms",
                    self.timeout.as_millis()
                ))
            }
        }
    }
}
