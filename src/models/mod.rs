//! Core data models for the paper atlas.
//!
//! This module contains the data structures shared by every layer: paper
//! records with their ingested metadata and derived discovery scores, search
//! results with provenance, and the closed vocabularies (novelty types,
//! difficulty levels) used by filters and discovery views.

mod published;
mod scores;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) use published::parse_timestamp;
pub use published::{DateRange, PublishedDate, DAYS_PER_MONTH, MIN_AGE_MONTHS};
pub use scores::{
    ImpactComponent, ImpactComponentKind, ImpactScore, NoveltyClassification, PaperScores,
    ReproducibilitySignal, ReproducibilityScore, ScoreSignal,
};

/// Error returned when a string does not name a member of a closed vocabulary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    /// Name of the vocabulary (e.g. "novelty type")
    pub kind: &'static str,

    /// The rejected input
    pub value: String,
}

/// Represents a single author with their affiliation information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    /// Full name of the author
    pub name: String,

    /// Institutional affiliation (e.g., university, research lab)
    #[serde(default)]
    pub affiliation: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
        }
    }
}

/// Closed-set classification of a paper's primary contribution.
///
/// `Unclassified` is the answer whenever the evidence is absent or ambiguous;
/// the classifier never guesses between tied categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyType {
    Architecture,
    Technique,
    Dataset,
    Benchmark,
    Theory,
    Unclassified,
}

impl NoveltyType {
    /// Every member, in display order.
    pub const ALL: [NoveltyType; 6] = [
        NoveltyType::Architecture,
        NoveltyType::Technique,
        NoveltyType::Dataset,
        NoveltyType::Benchmark,
        NoveltyType::Theory,
        NoveltyType::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoveltyType::Architecture => "architecture",
            NoveltyType::Technique => "technique",
            NoveltyType::Dataset => "dataset",
            NoveltyType::Benchmark => "benchmark",
            NoveltyType::Theory => "theory",
            NoveltyType::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for NoveltyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoveltyType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        NoveltyType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| UnknownVariant {
                kind: "novelty type",
                value: s.to_string(),
            })
    }
}

/// Reading difficulty of a paper, ordered from easiest to hardest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl Difficulty {
    /// Every level in strictly increasing difficulty.
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
        Difficulty::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Difficulty::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| UnknownVariant {
                kind: "difficulty",
                value: s.to_string(),
            })
    }
}

/// A research paper as held by the Paper Store.
///
/// Ingestion owns every field except `scores`, which the discovery scorer
/// rewrites on each recompute cycle. The embedding vector is produced
/// externally and treated as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Immutable identity (e.g. an arXiv identifier)
    pub id: String,

    /// Paper title
    pub title: String,

    /// List of authors with their affiliations
    #[serde(default)]
    pub authors: Vec<Author>,

    /// Abstract text
    pub abstract_text: String,

    /// Subject category (e.g. "cs.CL")
    #[serde(default)]
    pub category: String,

    /// Publication timestamp, or the explicit unknown state
    pub published: PublishedDate,

    /// Total citations; never decreases between ingestion runs
    #[serde(default)]
    pub citation_count: u64,

    /// Code repository links found for the paper
    #[serde(default)]
    pub github_urls: Vec<String>,

    /// Whether an in-depth analysis of the paper exists
    #[serde(default)]
    pub has_deep_analysis: bool,

    /// Named datasets the paper evaluates on or releases
    #[serde(default)]
    pub dataset_mentions: Vec<String>,

    /// Curated difficulty, when ingestion supplied one
    #[serde(default)]
    pub difficulty: Option<Difficulty>,

    /// Vector embedding of the abstract
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,

    /// Derived discovery scores; absent until the first recompute
    #[serde(default)]
    pub scores: Option<PaperScores>,
}

impl Paper {
    /// Create a paper with the given identity and text and empty metadata.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: abstract_text.into(),
            category: String::new(),
            published: PublishedDate::DateUnknown { raw: None },
            citation_count: 0,
            github_urls: Vec::new(),
            has_deep_analysis: false,
            dataset_mentions: Vec::new(),
            difficulty: None,
            embedding: None,
            scores: None,
        }
    }

    /// Direct code-link check: at least one URL points at a GitHub repository.
    pub fn has_github_link(&self) -> bool {
        self.github_urls.iter().any(|url| is_github_repo_url(url))
    }

    /// Number of distinct GitHub repositories linked from the paper.
    pub fn github_repo_count(&self) -> usize {
        let mut repos: Vec<String> = self
            .github_urls
            .iter()
            .filter_map(|url| github_repo_slug(url))
            .collect();
        repos.sort();
        repos.dedup();
        repos.len()
    }

    pub fn citation_velocity(&self) -> Option<f64> {
        self.scores.as_ref().and_then(|s| s.citation_velocity)
    }

    pub fn reproducibility_score(&self) -> Option<f64> {
        self.scores.as_ref().map(|s| s.reproducibility.score)
    }

    pub fn impact_score(&self) -> Option<f64> {
        self.scores.as_ref().map(|s| s.impact.score)
    }

    /// Novelty type from the last scoring pass; unscored papers are unclassified.
    pub fn novelty_type(&self) -> NoveltyType {
        self.scores
            .as_ref()
            .map(|s| s.novelty.novelty_type)
            .unwrap_or(NoveltyType::Unclassified)
    }

    /// Effective difficulty: the scored level, falling back to the curated one.
    pub fn difficulty_level(&self) -> Option<Difficulty> {
        self.scores
            .as_ref()
            .map(|s| s.difficulty)
            .or(self.difficulty)
    }
}

/// Returns `owner/repo` (lowercased) when the URL points at a GitHub repository.
pub fn github_repo_slug(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    let path = without_www.strip_prefix("github.com/")?;

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?.trim_end_matches(".git");
    if repo.is_empty() {
        return None;
    }
    Some(format!("{}/{}", owner.to_lowercase(), repo.to_lowercase()))
}

/// Check whether a URL points at a GitHub repository (not just the site).
pub fn is_github_repo_url(url: &str) -> bool {
    github_repo_slug(url).is_some()
}

/// Compact view of a paper used in search results and discovery views.
///
/// Derived fields are `None` for papers that have not been scored yet, and
/// `published` keeps the explicit unknown state rather than a placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperSummary {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub category: String,
    pub published: PublishedDate,
    pub citation_count: u64,
    pub citation_velocity: Option<f64>,
    pub has_github_link: bool,
    pub has_deep_analysis: bool,
    pub reproducibility_score: Option<f64>,
    pub impact_score: Option<f64>,
    pub novelty_type: NoveltyType,
    pub difficulty: Option<Difficulty>,
}

impl From<&Paper> for PaperSummary {
    fn from(paper: &Paper) -> Self {
        Self {
            id: paper.id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.iter().map(|a| a.name.clone()).collect(),
            category: paper.category.clone(),
            published: paper.published.clone(),
            citation_count: paper.citation_count,
            citation_velocity: paper.citation_velocity(),
            has_github_link: paper.has_github_link(),
            has_deep_analysis: paper.has_deep_analysis,
            reproducibility_score: paper.reproducibility_score(),
            impact_score: paper.impact_score(),
            novelty_type: paper.novelty_type(),
            difficulty: paper.difficulty_level(),
        }
    }
}

/// Which retrieval branch produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Semantic,
    Keyword,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Semantic => f.write_str("semantic"),
            Provenance::Keyword => f.write_str("keyword"),
        }
    }
}

/// Relevance classification for semantic search results.
///
/// Papers are categorized by their semantic similarity to the query,
/// allowing clients to understand the quality of matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Lower similarity but still above the search threshold
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }
}

/// A single hit from one retrieval branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Identity of the matched paper
    pub paper_id: String,

    /// Branch that produced the hit
    pub provenance: Provenance,

    /// Cosine similarity (semantic) or term-match score (keyword)
    pub relevance_score: f32,

    /// 1-based position within its own result group
    pub rank: usize,

    /// Similarity band, only meaningful for semantic hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<RelevanceLevel>,
}

impl SearchResult {
    /// Create a semantic hit from a cosine similarity score.
    pub fn semantic(paper_id: impl Into<String>, score: f32) -> Self {
        Self {
            paper_id: paper_id.into(),
            provenance: Provenance::Semantic,
            relevance_score: score,
            rank: 0,
            relevance: Some(RelevanceLevel::from_score(score)),
        }
    }

    /// Create a keyword hit from a term-match score.
    pub fn keyword(paper_id: impl Into<String>, score: f32) -> Self {
        Self {
            paper_id: paper_id.into(),
            provenance: Provenance::Keyword,
            relevance_score: score,
            rank: 0,
            relevance: None,
        }
    }
}

/// Configuration for the embedding model.
///
/// This configuration is stored alongside the database to ensure consistency
/// between ingestion and query-time embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "text-embedding-3-small")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}
