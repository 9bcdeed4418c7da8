//! Learning paths: papers on one topic laid out from easiest to hardest.
//!
//! Topic relevance comes from the semantic index, the same lookup hybrid
//! search uses. A paper joins the path only if its similarity to the topic
//! exceeds the threshold; a level with too few relevant papers stays short
//! or empty instead of being padded with unrelated work.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use super::snapshot::ScoreSnapshot;
use super::{DiscoveryError, DiscoveryResult};
use crate::index::SemanticIndex;
use crate::models::{Difficulty, Paper, PaperSummary};
use crate::query::Completeness;

/// One paper on a learning path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningPathEntry {
    /// Cosine similarity to the topic; absent for topic-less paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f32>,
    pub paper: PaperSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningPathLevel {
    pub level: Difficulty,
    pub papers: Vec<LearningPathEntry>,
    /// Papers at this level that qualified, before the per-level limit
    pub total_matching: usize,
    pub completeness: Completeness,
}

/// Levels in strictly increasing difficulty; every level is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningPath {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Similarity a paper had to exceed to be included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_relevance: Option<f32>,
    pub levels: Vec<LearningPathLevel>,
}

impl LearningPath {
    pub fn paper_count(&self) -> usize {
        self.levels.iter().map(|l| l.papers.len()).sum()
    }
}

/// Build a learning path from `snapshot`.
///
/// With a topic, candidates are the papers `semantic` returns with a
/// similarity strictly above `min_relevance`; a failed lookup is an
/// `IndexUnavailable` error, never a fallback to keyword matching. Without a
/// topic every scored paper is a candidate.
///
/// Within a level papers are ordered by relevance, then impact, then id.
pub async fn build(
    snapshot: &ScoreSnapshot,
    topic: Option<&str>,
    semantic: &dyn SemanticIndex,
    min_relevance: f32,
    level_limit: usize,
) -> DiscoveryResult<LearningPath> {
    let topic = topic.map(str::trim).filter(|t| !t.is_empty());

    let candidates: Vec<(&Paper, Option<f32>)> = match topic {
        Some(topic) => {
            let hits = semantic
                .nearest(topic, usize::MAX, min_relevance)
                .await
                .map_err(|e| DiscoveryError::IndexUnavailable(e.to_string()))?;
            let relevance: HashMap<String, f32> = hits
                .into_iter()
                .filter(|hit| hit.relevance_score > min_relevance)
                .map(|hit| (hit.paper_id, hit.relevance_score))
                .collect();
            snapshot
                .papers()
                .iter()
                .filter_map(|p| relevance.get(&p.id).map(|score| (p, Some(*score))))
                .collect()
        }
        None => snapshot.papers().iter().map(|p| (p, None)).collect(),
    };
    debug!(
        topic = topic.unwrap_or(""),
        candidates = candidates.len(),
        "Building learning path"
    );

    let levels = Difficulty::ALL
        .iter()
        .map(|level| {
            let mut at_level: Vec<(&Paper, Option<f32>)> = candidates
                .iter()
                .filter(|(p, _)| p.difficulty_level() == Some(*level))
                .copied()
                .collect();
            at_level.sort_by(|a, b| compare_entries(*a, *b));

            let total_matching = at_level.len();
            let completeness = if total_matching > level_limit {
                Completeness::Capped
            } else {
                Completeness::Exhausted
            };
            let papers = at_level
                .into_iter()
                .take(level_limit)
                .map(|(paper, relevance)| LearningPathEntry {
                    relevance,
                    paper: PaperSummary::from(paper),
                })
                .collect();

            LearningPathLevel {
                level: *level,
                papers,
                total_matching,
                completeness,
            }
        })
        .collect();

    Ok(LearningPath {
        topic: topic.map(str::to_string),
        min_relevance: topic.map(|_| min_relevance),
        levels,
    })
}

fn compare_entries(a: (&Paper, Option<f32>), b: (&Paper, Option<f32>)) -> Ordering {
    let relevance = |x: Option<f32>| x.unwrap_or(f32::NEG_INFINITY);
    let impact = |p: &Paper| p.impact_score().unwrap_or(f64::NEG_INFINITY);
    relevance(b.1)
        .total_cmp(&relevance(a.1))
        .then_with(|| impact(b.0).total_cmp(&impact(a.0)))
        .then_with(|| a.0.id.cmp(&b.0.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryScorer;
    use crate::index::{IndexError, IndexResult};
    use crate::models::SearchResult;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Returns fixed similarities regardless of the query.
    struct FixedSemantic(Vec<(&'static str, f32)>);

    #[async_trait]
    impl SemanticIndex for FixedSemantic {
        async fn nearest(
            &self,
            _query: &str,
            _limit: usize,
            min_score: f32,
        ) -> IndexResult<Vec<SearchResult>> {
            Ok(self
                .0
                .iter()
                .filter(|(_, s)| *s >= min_score)
                .map(|(id, s)| SearchResult::semantic(*id, *s))
                .collect())
        }
    }

    struct DownSemantic;

    #[async_trait]
    impl SemanticIndex for DownSemantic {
        async fn nearest(&self, _: &str, _: usize, _: f32) -> IndexResult<Vec<SearchResult>> {
            Err(IndexError::Unavailable("no embedder".to_string()))
        }
    }

    fn paper(id: &str, difficulty: Difficulty) -> Paper {
        let mut p = Paper::new(id, format!("Paper {}", id), "x");
        p.difficulty = Some(difficulty);
        p
    }

    fn snapshot() -> ScoreSnapshot {
        let papers = vec![
            paper("vlm-intro", Difficulty::Beginner),
            paper("vlm-arch", Difficulty::Advanced),
            paper("scratch", Difficulty::Advanced),
            paper("dental", Difficulty::Expert),
            paper("vlm-theory", Difficulty::Expert),
        ];
        ScoreSnapshot::build(1, Utc::now(), DiscoveryScorer::new().score_all(papers, Utc::now()))
    }

    #[tokio::test]
    async fn test_levels_only_hold_relevant_papers() {
        let semantic = FixedSemantic(vec![
            ("vlm-intro", 0.82),
            ("vlm-arch", 0.77),
            ("vlm-theory", 0.64),
            ("scratch", 0.12),
            ("dental", 0.35),
        ]);
        let path = build(&snapshot(), Some("vision language models"), &semantic, 0.35, 5)
            .await
            .unwrap();

        let levels: Vec<Difficulty> = path.levels.iter().map(|l| l.level).collect();
        assert_eq!(levels, Difficulty::ALL.to_vec());

        let ids: Vec<Vec<&str>> = path
            .levels
            .iter()
            .map(|l| l.papers.iter().map(|e| e.paper.id.as_str()).collect())
            .collect();
        assert_eq!(
            ids,
            vec![vec!["vlm-intro"], vec![], vec!["vlm-arch"], vec!["vlm-theory"]]
        );
        for level in &path.levels {
            for entry in &level.papers {
                assert!(entry.relevance.unwrap() > 0.35);
            }
        }
    }

    #[tokio::test]
    async fn test_per_level_limit_caps() {
        let semantic = FixedSemantic(vec![("vlm-theory", 0.9), ("dental", 0.8)]);
        let path = build(&snapshot(), Some("vlm"), &semantic, 0.3, 1).await.unwrap();
        let expert = &path.levels[3];
        assert_eq!(expert.papers.len(), 1);
        assert_eq!(expert.papers[0].paper.id, "vlm-theory");
        assert_eq!(expert.total_matching, 2);
        assert_eq!(expert.completeness, Completeness::Capped);
    }

    #[tokio::test]
    async fn test_topic_requires_semantic_index() {
        let err = build(&snapshot(), Some("vlm"), &DownSemantic, 0.35, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_without_topic_uses_whole_corpus() {
        let path = build(&snapshot(), None, &DownSemantic, 0.35, 5).await.unwrap();
        assert_eq!(path.paper_count(), 5);
        assert_eq!(path.topic, None);
        assert_eq!(path.levels[2].papers.len(), 2);
    }
}
