//! Discovery Scorer.
//!
//! Pure functions of a paper and a reference time. The same paper scored
//! against the same `now` always yields the same [`PaperScores`], which keeps
//! the scheduled recompute idempotent.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::models::{
    Difficulty, ImpactComponent, ImpactComponentKind, ImpactScore, NoveltyClassification,
    NoveltyType, Paper, PaperScores, PublishedDate, ReproducibilityScore, ReproducibilitySignal,
    ScoreSignal,
};

pub const MAX_SCORE: f64 = 10.0;

const GITHUB_REPO_POINTS: f64 = 4.0;
const ADDITIONAL_REPO_POINTS: f64 = 1.0;
const MAX_ADDITIONAL_REPOS: usize = 2;
const DEEP_ANALYSIS_POINTS: f64 = 2.0;
const DATASET_POINTS: f64 = 1.0;
const MAX_DATASETS: usize = 2;
const CODE_STATEMENT_POINTS: f64 = 1.0;

const VELOCITY_WEIGHT: f64 = 0.5;
const COUNT_WEIGHT: f64 = 0.3;
const REPRODUCIBILITY_WEIGHT: f64 = 0.2;

/// Citations per month at which the velocity component reaches ~63%.
const VELOCITY_SCALE: f64 = 20.0;

/// log10(1 + citations) at which the count component saturates (10k citations).
const COUNT_SATURATION_LOG: f64 = 4.0;

/// Citation count above which an architecture/technique paper counts as foundational.
const FOUNDATIONAL_CITATIONS: u64 = 1_000;

const CODE_STATEMENT_CUES: &[&str] = &[
    "code is available",
    "code available",
    "code is publicly available",
    "open-source",
    "open source",
    "we release our code",
    "source code",
];

const NOVELTY_CUES: &[(NoveltyType, &[&str])] = &[
    (
        NoveltyType::Architecture,
        &[
            "architecture",
            "backbone",
            "network design",
            "novel model",
            "new model",
            "encoder-decoder",
        ],
    ),
    (
        NoveltyType::Technique,
        &[
            "technique",
            "algorithm",
            "training procedure",
            "training method",
            "optimization method",
            "fine-tuning method",
            "regularization",
        ],
    ),
    (
        NoveltyType::Dataset,
        &[
            "dataset",
            "corpus",
            "annotated",
            "data collection",
            "we collect",
        ],
    ),
    (
        NoveltyType::Benchmark,
        &[
            "benchmark",
            "leaderboard",
            "evaluation suite",
            "evaluation framework",
            "test suite",
        ],
    ),
    (
        NoveltyType::Theory,
        &[
            "theorem",
            "we prove",
            "proof",
            "theoretical",
            "convergence rate",
            "lower bound",
            "upper bound",
        ],
    ),
];

const INTRODUCTORY_CUES: &[&str] = &[
    "survey",
    "tutorial",
    "overview",
    "introduction to",
    "primer",
    "a review of",
];

const THEORY_CUES: &[&str] = &["theorem", "we prove", "proof of"];

/// Stateless scorer; construct once and share.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscoveryScorer;

impl DiscoveryScorer {
    pub fn new() -> Self {
        Self
    }

    /// Compute every derived field for one paper.
    pub fn score(&self, paper: &Paper, now: DateTime<Utc>) -> PaperScores {
        let citation_velocity = citation_velocity(paper.citation_count, &paper.published, now);
        let reproducibility = reproducibility(paper);
        let novelty = classify_novelty(paper);
        let impact = impact(citation_velocity, paper.citation_count, reproducibility.score);
        let difficulty = infer_difficulty(paper, novelty.novelty_type);

        PaperScores {
            citation_velocity,
            reproducibility,
            novelty,
            impact,
            difficulty,
            scored_at: now,
        }
    }

    /// Score a whole corpus, replacing each paper's previous scores.
    pub fn score_all(&self, papers: Vec<Paper>, now: DateTime<Utc>) -> Vec<Paper> {
        papers
            .into_iter()
            .map(|mut paper| {
                paper.scores = Some(self.score(&paper, now));
                paper
            })
            .collect()
    }
}

/// Citations per month since publication.
///
/// Paper age is clamped below at one day, so very new (or future-dated)
/// papers never divide by zero. Unknown dates have no velocity.
pub fn citation_velocity(
    citation_count: u64,
    published: &PublishedDate,
    now: DateTime<Utc>,
) -> Option<f64> {
    published
        .months_since(now)
        .map(|months| citation_count as f64 / months)
}

/// Bounded 0–10 reproducibility heuristic.
///
/// Every signal only ever adds points, so gaining evidence (another verified
/// repository, a dataset mention) never lowers the score.
pub fn reproducibility(paper: &Paper) -> ReproducibilityScore {
    let mut signals = Vec::new();

    let mut repos: BTreeSet<String> = BTreeSet::new();
    for url in &paper.github_urls {
        if let Some(slug) = crate::models::github_repo_slug(url) {
            repos.insert(slug);
        }
    }
    let mut repo_iter = repos.iter();
    if let Some(first) = repo_iter.next() {
        signals.push(ScoreSignal {
            signal: ReproducibilitySignal::GithubRepository,
            contribution: GITHUB_REPO_POINTS,
            detail: format!("github.com/{}", first),
        });
    }
    for extra in repo_iter.take(MAX_ADDITIONAL_REPOS) {
        signals.push(ScoreSignal {
            signal: ReproducibilitySignal::AdditionalRepository,
            contribution: ADDITIONAL_REPO_POINTS,
            detail: format!("github.com/{}", extra),
        });
    }

    if paper.has_deep_analysis {
        signals.push(ScoreSignal {
            signal: ReproducibilitySignal::DeepAnalysis,
            contribution: DEEP_ANALYSIS_POINTS,
            detail: "in-depth analysis available".to_string(),
        });
    }

    let datasets: BTreeSet<String> = paper
        .dataset_mentions
        .iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    for dataset in datasets.iter().take(MAX_DATASETS) {
        signals.push(ScoreSignal {
            signal: ReproducibilitySignal::DatasetMention,
            contribution: DATASET_POINTS,
            detail: dataset.clone(),
        });
    }

    let text = paper.abstract_text.to_lowercase();
    if let Some(cue) = CODE_STATEMENT_CUES.iter().find(|cue| text.contains(*cue)) {
        signals.push(ScoreSignal {
            signal: ReproducibilitySignal::CodeAvailabilityStatement,
            contribution: CODE_STATEMENT_POINTS,
            detail: format!("abstract mentions \"{}\"", cue),
        });
    }

    let raw: f64 = signals.iter().map(|s| s.contribution).sum();
    ReproducibilityScore {
        score: raw.min(MAX_SCORE),
        signals,
    }
}

/// Closed-set novelty classification from cue phrases in title and abstract.
///
/// The type with the strictly highest cue count wins; no cues or a tie at the
/// top yields `Unclassified`.
pub fn classify_novelty(paper: &Paper) -> NoveltyClassification {
    let text = format!("{} {}", paper.title, paper.abstract_text).to_lowercase();

    let mut cue_counts = BTreeMap::new();
    for (novelty_type, cues) in NOVELTY_CUES {
        let count: usize = cues.iter().map(|cue| text.matches(cue).count()).sum();
        if count > 0 {
            cue_counts.insert(*novelty_type, count);
        }
    }

    let best = cue_counts.values().copied().max().unwrap_or(0);
    let leaders: Vec<NoveltyType> = cue_counts
        .iter()
        .filter(|(_, count)| **count == best)
        .map(|(t, _)| *t)
        .collect();

    let novelty_type = match leaders.as_slice() {
        [single] if best > 0 => *single,
        _ => NoveltyType::Unclassified,
    };

    NoveltyClassification {
        novelty_type,
        cue_counts,
    }
}

/// Composite 0–10 impact score.
///
/// Components are normalized to [0, 1]. When the velocity is unknown its
/// weight is spread over the remaining components so undated papers are
/// not penalized for missing metadata.
pub fn impact(velocity: Option<f64>, citation_count: u64, reproducibility: f64) -> ImpactScore {
    let mut parts: Vec<(ImpactComponentKind, f64, f64)> = Vec::with_capacity(3);
    if let Some(v) = velocity {
        parts.push((
            ImpactComponentKind::CitationVelocity,
            1.0 - (-v.max(0.0) / VELOCITY_SCALE).exp(),
            VELOCITY_WEIGHT,
        ));
    }
    parts.push((
        ImpactComponentKind::CitationCount,
        ((1.0 + citation_count as f64).log10() / COUNT_SATURATION_LOG).min(1.0),
        COUNT_WEIGHT,
    ));
    parts.push((
        ImpactComponentKind::Reproducibility,
        (reproducibility / MAX_SCORE).clamp(0.0, 1.0),
        REPRODUCIBILITY_WEIGHT,
    ));

    let total_weight: f64 = parts.iter().map(|(_, _, w)| w).sum();
    let components: Vec<ImpactComponent> = parts
        .into_iter()
        .map(|(component, value, weight)| ImpactComponent {
            component,
            value,
            weight: weight / total_weight,
        })
        .collect();
    let score = MAX_SCORE * components.iter().map(|c| c.value * c.weight).sum::<f64>();

    ImpactScore {
        score: score.clamp(0.0, MAX_SCORE),
        components,
    }
}

/// Reading difficulty; a curated value always wins over inference.
pub fn infer_difficulty(paper: &Paper, novelty: NoveltyType) -> Difficulty {
    if let Some(curated) = paper.difficulty {
        return curated;
    }

    let text = format!("{} {}", paper.title, paper.abstract_text).to_lowercase();
    if INTRODUCTORY_CUES.iter().any(|cue| text.contains(cue)) {
        return Difficulty::Beginner;
    }
    if novelty == NoveltyType::Theory || THEORY_CUES.iter().any(|cue| text.contains(cue)) {
        return Difficulty::Expert;
    }

    match novelty {
        NoveltyType::Architecture | NoveltyType::Technique
            if paper.citation_count >= FOUNDATIONAL_CITATIONS =>
        {
            Difficulty::Intermediate
        }
        NoveltyType::Architecture | NoveltyType::Technique => Difficulty::Advanced,
        _ => Difficulty::Intermediate,
    }
}
