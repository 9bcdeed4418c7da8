//! Ranked discovery views over the current score snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::learning_path::{self, LearningPath};
use super::snapshot::{ScoreSnapshot, SnapshotStore};
use super::{DiscoveryError, DiscoveryResult};
use crate::cache::{CacheStats, DiscoveryCache};
use crate::config::DiscoverySettings;
use crate::embedding::EmbeddingProvider;
use crate::index::EmbeddingSemanticIndex;
use crate::models::{NoveltyType, Paper, PaperSummary, UnknownVariant};
use crate::query::Completeness;

/// Threshold the reproducible view uses when the caller gives none.
pub const DEFAULT_MIN_REPRODUCIBILITY: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryViewName {
    Reproducible,
    Impact,
    Rising,
    Techniques,
    LearningPath,
}

impl DiscoveryViewName {
    pub const ALL: [DiscoveryViewName; 5] = [
        DiscoveryViewName::Reproducible,
        DiscoveryViewName::Impact,
        DiscoveryViewName::Rising,
        DiscoveryViewName::Techniques,
        DiscoveryViewName::LearningPath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryViewName::Reproducible => "reproducible",
            DiscoveryViewName::Impact => "impact",
            DiscoveryViewName::Rising => "rising",
            DiscoveryViewName::Techniques => "techniques",
            DiscoveryViewName::LearningPath => "learning_path",
        }
    }
}

impl fmt::Display for DiscoveryViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryViewName {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        DiscoveryViewName::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| UnknownVariant {
                kind: "discovery view",
                value: s.to_string(),
            })
    }
}

/// View selection plus its parameters.
///
/// `limit: None` means the configured default. For learning paths the limit
/// applies per difficulty level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewParams {
    /// Reproducibility at least `min_reproducibility`; `has_code` requires a
    /// direct GitHub link
    Reproducible {
        min_reproducibility: f64,
        has_code: bool,
        limit: Option<usize>,
    },
    Impact {
        min_score: f64,
        limit: Option<usize>,
    },
    /// At least `min_citations`, fastest citation velocity first
    Rising {
        min_citations: u64,
        limit: Option<usize>,
    },
    /// Optionally restricted to one novelty type; always reports the full distribution
    Techniques {
        novelty_type: Option<NoveltyType>,
        limit: Option<usize>,
    },
    LearningPath {
        topic: Option<String>,
        limit: Option<usize>,
    },
}

impl ViewParams {
    pub fn reproducible() -> Self {
        ViewParams::Reproducible {
            min_reproducibility: DEFAULT_MIN_REPRODUCIBILITY,
            has_code: true,
            limit: None,
        }
    }

    pub fn impact() -> Self {
        ViewParams::Impact {
            min_score: 0.0,
            limit: None,
        }
    }

    pub fn rising() -> Self {
        ViewParams::Rising {
            min_citations: 0,
            limit: None,
        }
    }

    pub fn techniques() -> Self {
        ViewParams::Techniques {
            novelty_type: None,
            limit: None,
        }
    }

    pub fn learning_path(topic: Option<String>) -> Self {
        ViewParams::LearningPath { topic, limit: None }
    }

    pub fn name(&self) -> DiscoveryViewName {
        match self {
            ViewParams::Reproducible { .. } => DiscoveryViewName::Reproducible,
            ViewParams::Impact { .. } => DiscoveryViewName::Impact,
            ViewParams::Rising { .. } => DiscoveryViewName::Rising,
            ViewParams::Techniques { .. } => DiscoveryViewName::Techniques,
            ViewParams::LearningPath { .. } => DiscoveryViewName::LearningPath,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            ViewParams::Reproducible { limit, .. }
            | ViewParams::Impact { limit, .. }
            | ViewParams::Rising { limit, .. }
            | ViewParams::Techniques { limit, .. }
            | ViewParams::LearningPath { limit, .. } => *limit,
        }
    }

    /// Same parameters with a different limit.
    pub fn with_limit(mut self, new_limit: usize) -> Self {
        match &mut self {
            ViewParams::Reproducible { limit, .. }
            | ViewParams::Impact { limit, .. }
            | ViewParams::Rising { limit, .. }
            | ViewParams::Techniques { limit, .. }
            | ViewParams::LearningPath { limit, .. } => *limit = Some(new_limit),
        }
        self
    }

    fn validate(&self, settings: &DiscoverySettings) -> DiscoveryResult<()> {
        if let Some(limit) = self.limit() {
            if limit == 0 || limit > settings.max_limit {
                return Err(DiscoveryError::InvalidParams(format!(
                    "limit must lie in 1..={}, got {}",
                    settings.max_limit, limit
                )));
            }
        }
        let score = match self {
            ViewParams::Reproducible {
                min_reproducibility,
                ..
            } => Some(("min_reproducibility", *min_reproducibility)),
            ViewParams::Impact { min_score, .. } => Some(("min_score", *min_score)),
            _ => None,
        };
        if let Some((name, value)) = score {
            if !(0.0..=10.0).contains(&value) {
                return Err(DiscoveryError::InvalidParams(format!(
                    "{} must lie in [0, 10], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    fn cache_key(&self) -> DiscoveryResult<String> {
        serde_json::to_string(self).map_err(|e| DiscoveryError::Other(e.to_string()))
    }
}

/// A ranked view as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryView {
    pub view: DiscoveryViewName,
    pub snapshot_version: u64,
    pub computed_at: DateTime<Utc>,
    /// Ranked papers; empty for learning paths, whose papers live in `learning_path`
    pub papers: Vec<PaperSummary>,
    /// Papers that qualified before the limit was applied
    pub total_matching: usize,
    pub limit: usize,
    pub completeness: Completeness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub novelty_type_distribution: Option<BTreeMap<NoveltyType, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_path: Option<LearningPath>,
}

/// Answers discovery views, memoized per snapshot version.
pub struct DiscoveryViewService {
    snapshots: Arc<SnapshotStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    cache: DiscoveryCache<DiscoveryView>,
    settings: DiscoverySettings,
}

impl DiscoveryViewService {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            snapshots,
            embedder,
            cache: DiscoveryCache::new(settings.cache_ttl(), settings.cache_max_entries),
            settings,
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Compute (or reuse) the view described by `params`.
    ///
    /// # Errors
    /// - `InvalidParams` for out-of-range limits or thresholds
    /// - `IndexUnavailable` for a topic learning path without a usable semantic index
    pub async fn get_view(&self, params: &ViewParams) -> DiscoveryResult<DiscoveryView> {
        params.validate(&self.settings)?;

        let snapshot = self.snapshots.current();
        let key = params.cache_key()?;
        if let Some(view) = self.cache.get(&key, snapshot.version()) {
            return Ok(view);
        }

        let view = self.compute(&snapshot, params).await?;
        info!(
            view = %view.view,
            snapshot_version = view.snapshot_version,
            total_matching = view.total_matching,
            "Computed discovery view"
        );

        self.cache.insert(key, snapshot.version(), view.clone());
        Ok(view)
    }

    async fn compute(
        &self,
        snapshot: &ScoreSnapshot,
        params: &ViewParams,
    ) -> DiscoveryResult<DiscoveryView> {
        let default_limit = match params {
            ViewParams::LearningPath { .. } => self.settings.learning_path_level_limit,
            _ => self.settings.default_limit,
        };
        let limit = params.limit().unwrap_or(default_limit);

        if let ViewParams::LearningPath { topic, .. } = params {
            let semantic = EmbeddingSemanticIndex::new(self.embedder.clone(), snapshot.vectors());
            let path = learning_path::build(
                snapshot,
                topic.as_deref(),
                &semantic,
                self.settings.learning_path_min_relevance,
                limit,
            )
            .await?;
            let total_matching = path.levels.iter().map(|l| l.total_matching).sum();
            let completeness = if path
                .levels
                .iter()
                .any(|l| l.completeness == Completeness::Capped)
            {
                Completeness::Capped
            } else {
                Completeness::Exhausted
            };
            return Ok(DiscoveryView {
                view: DiscoveryViewName::LearningPath,
                snapshot_version: snapshot.version(),
                computed_at: snapshot.computed_at(),
                papers: Vec::new(),
                total_matching,
                limit,
                completeness,
                novelty_type_distribution: None,
                learning_path: Some(path),
            });
        }

        let ranked = rank(snapshot.papers(), params);
        let total_matching = ranked.len();
        let completeness = if total_matching > limit {
            Completeness::Capped
        } else {
            Completeness::Exhausted
        };
        let papers = ranked
            .into_iter()
            .take(limit)
            .map(PaperSummary::from)
            .collect();
        let novelty_type_distribution = match params {
            ViewParams::Techniques { .. } => Some(snapshot.novelty_distribution().clone()),
            _ => None,
        };

        Ok(DiscoveryView {
            view: params.name(),
            snapshot_version: snapshot.version(),
            computed_at: snapshot.computed_at(),
            papers,
            total_matching,
            limit,
            completeness,
            novelty_type_distribution,
            learning_path: None,
        })
    }
}

/// Filter and order papers for the list views.
///
/// Every ordering ends with the paper id, so equal keys rank deterministically.
/// Papers missing the sort key (unscored, or unknown velocity for `Rising`)
/// are left out. An unfiltered `Techniques` list is grouped by novelty type
/// first, then ranked by impact within each group.
pub fn rank<'a>(papers: &'a [Paper], params: &ViewParams) -> Vec<&'a Paper> {
    let mut keyed: Vec<(f64, &Paper)> = match params {
        ViewParams::Reproducible {
            min_reproducibility,
            has_code,
            ..
        } => papers
            .iter()
            .filter(|p| !*has_code || p.has_github_link())
            .filter_map(|p| p.reproducibility_score().map(|s| (s, p)))
            .filter(|(s, _)| *s >= *min_reproducibility)
            .collect(),
        ViewParams::Impact { min_score, .. } => papers
            .iter()
            .filter_map(|p| p.impact_score().map(|s| (s, p)))
            .filter(|(s, _)| *s >= *min_score)
            .collect(),
        ViewParams::Rising { min_citations, .. } => papers
            .iter()
            .filter(|p| p.citation_count >= *min_citations)
            .filter_map(|p| p.citation_velocity().map(|v| (v, p)))
            .collect(),
        ViewParams::Techniques { novelty_type, .. } => papers
            .iter()
            .filter(|p| p.scores.is_some())
            .filter(|p| novelty_type.map_or(true, |t| p.novelty_type() == t))
            .filter_map(|p| p.impact_score().map(|s| (s, p)))
            .collect(),
        ViewParams::LearningPath { .. } => Vec::new(),
    };

    let grouped = matches!(
        params,
        ViewParams::Techniques {
            novelty_type: None,
            ..
        }
    );
    keyed.sort_by(|a, b| {
        let group = if grouped {
            a.1.novelty_type().cmp(&b.1.novelty_type())
        } else {
            std::cmp::Ordering::Equal
        };
        group
            .then_with(|| b.0.total_cmp(&a.0))
            .then_with(|| a.1.id.cmp(&b.1.id))
    });
    keyed.into_iter().map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryScorer;
    use crate::models::PublishedDate;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn published_months_ago(months: i64) -> PublishedDate {
        PublishedDate::known(now() - Duration::days(months * 30))
    }

    fn corpus() -> Vec<Paper> {
        let mut old_classic = Paper::new("old", "Old Classic", "A widely cited method.");
        old_classic.citation_count = 12_000;
        old_classic.published = published_months_ago(96);

        let mut young_riser = Paper::new("young", "Young Riser", "A new method.");
        young_riser.citation_count = 600;
        young_riser.published = published_months_ago(3);

        let mut undated = Paper::new("undated", "Undated", "No date.");
        undated.citation_count = 5_000;
        undated.published = PublishedDate::parse("not a date");

        let mut with_code = Paper::new("code", "With Code", "We release code.");
        with_code.github_urls = vec![
            "https://github.com/a/one".to_string(),
            "https://github.com/a/two".to_string(),
        ];
        with_code.has_deep_analysis = true;
        with_code.published = published_months_ago(12);

        let mut analysis_only = Paper::new("analysis", "Analysis Only", "x");
        analysis_only.has_deep_analysis = true;
        analysis_only.dataset_mentions = vec!["A".to_string(), "B".to_string()];
        analysis_only.published = published_months_ago(12);

        DiscoveryScorer::new().score_all(
            vec![old_classic, young_riser, undated, with_code, analysis_only],
            now(),
        )
    }

    fn service() -> DiscoveryViewService {
        let snapshots = Arc::new(SnapshotStore::new(ScoreSnapshot::build(1, now(), corpus())));
        DiscoveryViewService::new(snapshots, None, DiscoverySettings::default())
    }

    fn ids(view: &DiscoveryView) -> Vec<&str> {
        view.papers.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_rising_prefers_velocity_over_total() {
        let view = service().get_view(&ViewParams::rising()).await.unwrap();
        let order = ids(&view);
        let young = order.iter().position(|id| *id == "young").unwrap();
        let old = order.iter().position(|id| *id == "old").unwrap();
        assert!(young < old);
        assert!(!order.contains(&"undated"));
        for pair in view.papers.windows(2) {
            assert!(pair[0].citation_velocity >= pair[1].citation_velocity);
        }
    }

    #[tokio::test]
    async fn test_reproducible_requires_direct_link_by_default() {
        let svc = service();
        let view = svc.get_view(&ViewParams::reproducible()).await.unwrap();
        assert_eq!(ids(&view), vec!["code"]);

        let relaxed = ViewParams::Reproducible {
            min_reproducibility: 0.0,
            has_code: false,
            limit: None,
        };
        let view = svc.get_view(&relaxed).await.unwrap();
        assert!(ids(&view).contains(&"analysis"));
        assert_eq!(view.papers.len(), 5);
    }

    #[tokio::test]
    async fn test_techniques_distribution_ignores_filter() {
        let params = ViewParams::Techniques {
            novelty_type: Some(NoveltyType::Benchmark),
            limit: None,
        };
        let view = service().get_view(&params).await.unwrap();
        let dist = view.novelty_type_distribution.unwrap();
        assert_eq!(dist.values().sum::<usize>(), 5);
        assert!(view
            .papers
            .iter()
            .all(|p| p.novelty_type == NoveltyType::Benchmark));
    }

    #[tokio::test]
    async fn test_unfiltered_techniques_are_grouped_by_type() {
        let mut bench = Paper::new(
            "bench_hot",
            "A benchmark for retrieval",
            "We release an evaluation suite and leaderboard.",
        );
        bench.citation_count = 5_000;
        bench.published = published_months_ago(24);

        let mut arch_hot = Paper::new(
            "arch_hot",
            "Backbone architecture at scale",
            "An encoder-decoder architecture.",
        );
        arch_hot.citation_count = 3_000;
        arch_hot.published = published_months_ago(24);

        let mut arch_cold = Paper::new(
            "arch_cold",
            "A new backbone architecture",
            "An encoder-decoder network design.",
        );
        arch_cold.citation_count = 10;
        arch_cold.published = published_months_ago(24);

        let scored = DiscoveryScorer::new().score_all(vec![bench, arch_cold, arch_hot], now());
        let snapshots = Arc::new(SnapshotStore::new(ScoreSnapshot::build(1, now(), scored)));
        let svc = DiscoveryViewService::new(snapshots, None, DiscoverySettings::default());

        let view = svc.get_view(&ViewParams::techniques()).await.unwrap();
        assert_eq!(ids(&view), vec!["arch_hot", "arch_cold", "bench_hot"]);
        let types: Vec<NoveltyType> = view.papers.iter().map(|p| p.novelty_type).collect();
        assert_eq!(
            types,
            vec![
                NoveltyType::Architecture,
                NoveltyType::Architecture,
                NoveltyType::Benchmark
            ]
        );
    }

    #[tokio::test]
    async fn test_distinct_requests_cannot_grow_cache_past_cap() {
        let snapshots = Arc::new(SnapshotStore::new(ScoreSnapshot::build(1, now(), corpus())));
        let svc = DiscoveryViewService::new(
            snapshots,
            None,
            DiscoverySettings {
                cache_max_entries: 8,
                ..DiscoverySettings::default()
            },
        );
        for i in 0..50 {
            let params = ViewParams::Impact {
                min_score: f64::from(i) / 10.0,
                limit: None,
            };
            svc.get_view(&params).await.unwrap();
        }
        assert_eq!(svc.cache_stats().entries, 8);
        assert_eq!(svc.cache_stats().misses, 50);
    }

    #[tokio::test]
    async fn test_limit_validation_and_completeness() {
        let svc = service();
        assert!(matches!(
            svc.get_view(&ViewParams::impact().with_limit(0)).await,
            Err(DiscoveryError::InvalidParams(_))
        ));
        assert!(matches!(
            svc.get_view(&ViewParams::impact().with_limit(1_000)).await,
            Err(DiscoveryError::InvalidParams(_))
        ));

        let view = svc.get_view(&ViewParams::impact().with_limit(2)).await.unwrap();
        assert_eq!(view.papers.len(), 2);
        assert_eq!(view.total_matching, 5);
        assert_eq!(view.completeness, Completeness::Capped);
    }

    #[tokio::test]
    async fn test_repeat_requests_hit_cache() {
        let svc = service();
        let first = svc.get_view(&ViewParams::impact()).await.unwrap();
        let second = svc.get_view(&ViewParams::impact()).await.unwrap();
        assert_eq!(first, second);
        let stats = svc.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_new_snapshot_invalidates_cache() {
        let snapshots = Arc::new(SnapshotStore::new(ScoreSnapshot::build(1, now(), corpus())));
        let svc = DiscoveryViewService::new(
            Arc::clone(&snapshots),
            None,
            DiscoverySettings::default(),
        );
        let before = svc.get_view(&ViewParams::impact()).await.unwrap();
        assert_eq!(before.snapshot_version, 1);

        snapshots.publish(ScoreSnapshot::build(2, now(), Vec::new()));
        let after = svc.get_view(&ViewParams::impact()).await.unwrap();
        assert_eq!(after.snapshot_version, 2);
        assert!(after.papers.is_empty());
    }

    #[tokio::test]
    async fn test_topic_learning_path_without_embedder_is_unavailable() {
        let err = service()
            .get_view(&ViewParams::learning_path(Some("vision language models".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::IndexUnavailable(_)));
    }

    #[test]
    fn test_view_name_parsing() {
        assert_eq!(
            "learning-path".parse::<DiscoveryViewName>().unwrap(),
            DiscoveryViewName::LearningPath
        );
        assert!("trending".parse::<DiscoveryViewName>().is_err());
    }
}
