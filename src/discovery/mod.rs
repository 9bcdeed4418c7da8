//! Discovery scoring and ranked views.
//!
//! The [`DiscoveryScorer`] derives citation velocity, reproducibility,
//! novelty, impact and difficulty for each paper. A background
//! [`ScoreRecomputer`] runs it on a schedule and publishes the result as an
//! immutable [`ScoreSnapshot`]; the [`DiscoveryViewService`] answers the
//! ranked views (reproducible, impact, rising, techniques, learning path)
//! from whichever snapshot is current.

pub mod learning_path;
pub mod recompute;
pub mod scorer;
pub mod snapshot;
pub mod views;

use thiserror::Error;

use crate::storage::StorageError;

pub use learning_path::{LearningPath, LearningPathLevel};
pub use recompute::{RecomputeReport, ScoreRecomputer};
pub use scorer::DiscoveryScorer;
pub use snapshot::{ScoreSnapshot, SnapshotStore};
pub use views::{DiscoveryView, DiscoveryViewName, DiscoveryViewService, ViewParams};

/// Errors that can occur while serving discovery views.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Out-of-range limits or thresholds
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The semantic index a learning path needs is not usable
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Discovery error: {0}")]
    Other(String),
}

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
