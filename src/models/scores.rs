//! Derived discovery scores and their explanations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Difficulty, NoveltyType};

/// Everything the discovery scorer derives for one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperScores {
    /// Citations per month; `None` when the publication date is unknown
    pub citation_velocity: Option<f64>,

    pub reproducibility: ReproducibilityScore,

    pub novelty: NoveltyClassification,

    pub impact: ImpactScore,

    pub difficulty: Difficulty,

    /// The "now" the scores were computed against
    pub scored_at: DateTime<Utc>,
}

/// Positive evidence that a paper's results can be reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReproducibilitySignal {
    GithubRepository,
    AdditionalRepository,
    DeepAnalysis,
    DatasetMention,
    CodeAvailabilityStatement,
}

/// One signal's contribution to a reproducibility score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSignal {
    pub signal: ReproducibilitySignal,
    pub contribution: f64,
    pub detail: String,
}

/// Bounded 0–10 reproducibility heuristic with the signals that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproducibilityScore {
    pub score: f64,
    pub signals: Vec<ScoreSignal>,
}

/// Novelty type plus the cue counts that decided it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyClassification {
    pub novelty_type: NoveltyType,
    pub cue_counts: BTreeMap<NoveltyType, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactComponentKind {
    CitationVelocity,
    CitationCount,
    Reproducibility,
}

/// A normalized (0–1) input to the impact composite and its effective weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactComponent {
    pub component: ImpactComponentKind,
    pub value: f64,
    pub weight: f64,
}

/// Composite 0–10 impact score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactScore {
    pub score: f64,
    pub components: Vec<ImpactComponent>,
}
