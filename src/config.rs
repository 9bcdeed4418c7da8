//! Service configuration.
//!
//! Configuration is read from an optional TOML file. Every field has a
//! default, so an absent file or a partial file both yield a usable config;
//! binaries then apply command-line and environment overrides on top.
//!
//! ```toml
//! [server]
//! port = 8600
//!
//! [search]
//! semantic_timeout_ms = 1500
//! semantic_limit = 6
//!
//! [discovery]
//! cache_ttl_secs = 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub search: SearchSettings,
    pub discovery: DiscoverySettings,
    pub embedding: EmbeddingSettings,
    pub advisor: AdvisorSettings,
}

/// Network settings for the REST server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite Paper Store location
    pub db_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("papers.db"),
        }
    }
}

/// Query routing and merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Budget for the semantic branch (query embedding + nearest neighbours)
    pub semantic_timeout_ms: u64,

    /// Budget for the keyword branch
    pub keyword_timeout_ms: u64,

    /// Outer deadline for a whole search request
    pub request_timeout_ms: u64,

    /// Maximum "Smart Results" returned
    pub semantic_limit: usize,

    /// Maximum "Additional Results" returned
    pub keyword_limit: usize,

    /// Candidates fetched from each branch before filtering
    pub candidate_pool: usize,

    /// Cosine similarity below which a semantic hit is discarded
    pub min_semantic_relevance: f32,

    /// Longest accepted query, in characters
    pub max_query_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            semantic_timeout_ms: 2_000,
            keyword_timeout_ms: 1_000,
            request_timeout_ms: 5_000,
            semantic_limit: 6,
            keyword_limit: 10,
            candidate_pool: 200,
            min_semantic_relevance: 0.30,
            max_query_chars: 512,
        }
    }
}

impl SearchSettings {
    pub fn semantic_timeout(&self) -> Duration {
        Duration::from_millis(self.semantic_timeout_ms)
    }

    pub fn keyword_timeout(&self) -> Duration {
        Duration::from_millis(self.keyword_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Scoring cadence, caching and view defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Interval between background score recomputations
    pub recompute_interval_secs: u64,

    /// Maximum age of a cached discovery view
    pub cache_ttl_secs: u64,

    /// Cached views kept at once; the oldest is evicted beyond this
    pub cache_max_entries: usize,

    /// Minimum topic similarity for a paper to join a learning path
    pub learning_path_min_relevance: f32,

    /// Per-level paper cap for learning paths when the caller gives no limit
    pub learning_path_level_limit: usize,

    pub default_limit: usize,

    pub max_limit: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            recompute_interval_secs: 86_400,
            cache_ttl_secs: 300,
            cache_max_entries: 1_024,
            learning_path_min_relevance: 0.35,
            learning_path_level_limit: 5,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl DiscoverySettings {
    pub fn recompute_interval(&self) -> Duration {
        Duration::from_secs(self.recompute_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Query-side embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// "openai" or "fastembed"
    pub provider: String,

    pub model: Option<String>,

    /// Never written back out; normally supplied through `OPENAI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub cache_dir: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            api_key: None,
            cache_dir: None,
        }
    }
}

/// External Research Advisor endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    /// Synthesis endpoint URL; unset disables the advisor
    pub endpoint: Option<String>,

    pub timeout_ms: u64,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 3_000,
        }
    }
}

impl AdvisorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AtlasConfig {
    /// Load configuration from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&content).map_err(|e| match e {
                    ConfigError::Parse { message, .. } => ConfigError::Parse {
                        path: path.to_path_buf(),
                        message,
                    },
                    other => other,
                })?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: AtlasConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the service misbehave silently.
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.search;
        if s.semantic_timeout_ms == 0 || s.keyword_timeout_ms == 0 || s.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("search timeouts must be positive".to_string()));
        }
        if s.semantic_timeout_ms > s.request_timeout_ms || s.keyword_timeout_ms > s.request_timeout_ms {
            return Err(ConfigError::Invalid(
                "branch timeouts must not exceed request_timeout_ms".to_string(),
            ));
        }
        if s.semantic_limit == 0 || s.keyword_limit == 0 {
            return Err(ConfigError::Invalid("result limits must be positive".to_string()));
        }
        if s.candidate_pool < s.semantic_limit.max(s.keyword_limit) {
            return Err(ConfigError::Invalid(
                "candidate_pool must be at least the larger result limit".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&s.min_semantic_relevance) {
            return Err(ConfigError::Invalid(
                "min_semantic_relevance must lie in [-1, 1]".to_string(),
            ));
        }

        let d = &self.discovery;
        if d.recompute_interval_secs == 0 {
            return Err(ConfigError::Invalid("recompute_interval_secs must be positive".to_string()));
        }
        if d.cache_max_entries == 0 {
            return Err(ConfigError::Invalid("cache_max_entries must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&d.learning_path_min_relevance) {
            return Err(ConfigError::Invalid(
                "learning_path_min_relevance must lie in [0, 1]".to_string(),
            ));
        }
        if d.default_limit == 0 || d.default_limit > d.max_limit {
            return Err(ConfigError::Invalid(
                "default_limit must be positive and not exceed max_limit".to_string(),
            ));
        }

        if self.advisor.timeout_ms == 0 {
            return Err(ConfigError::Invalid("advisor timeout must be positive".to_string()));
        }
        Ok(())
    }
}
