//! Result merging for hybrid search.
//!
//! Semantic hits become "Smart Results" and keyword hits "Additional
//! Results". A paper found by both branches appears once: in the semantic
//! group if it survives that group's limit, otherwise among the keyword hits.
//! The two groups are ranked independently and never interleaved.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::filters::FilterSet;
use crate::discovery::ScoreSnapshot;
use crate::models::{Paper, PaperSummary, Provenance, RelevanceLevel, SearchResult};

/// Resolves paper ids to records.
pub trait PaperLookup {
    fn paper(&self, id: &str) -> Option<&Paper>;
}

impl PaperLookup for ScoreSnapshot {
    fn paper(&self, id: &str) -> Option<&Paper> {
        self.get(id)
    }
}

impl PaperLookup for HashMap<String, Paper> {
    fn paper(&self, id: &str) -> Option<&Paper> {
        self.get(id)
    }
}

/// Whether a group shows everything that matched or was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Every candidate that passed the filters is listed
    Exhausted,
    /// More candidates existed than the group limit (or the branch pool) allowed
    Capped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeLimits {
    pub semantic_limit: usize,
    pub keyword_limit: usize,
    /// Candidates each branch was asked for; a full pool means there may be more
    pub candidate_pool: usize,
}

/// One entry in a merged result group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedHit {
    /// 1-based position within its own group
    pub rank: usize,
    pub paper_id: String,
    pub provenance: Provenance,
    pub relevance_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<RelevanceLevel>,
    /// Names of the filters this paper satisfied
    pub matched_filters: Vec<String>,
    pub paper: PaperSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResults {
    pub semantic: Vec<MergedHit>,
    pub keyword: Vec<MergedHit>,
    pub semantic_completeness: Completeness,
    pub keyword_completeness: Completeness,
}

/// Filter, deduplicate and rank both branches' hits.
///
/// Hits whose paper is missing from `papers` are dropped. Ranking within a
/// group is by relevance score, ties broken by paper id.
pub fn merge(
    semantic: Vec<SearchResult>,
    keyword: Vec<SearchResult>,
    filters: &FilterSet,
    papers: &impl PaperLookup,
    limits: MergeLimits,
) -> MergedResults {
    let semantic_pool_full = semantic.len() >= limits.candidate_pool;
    let keyword_pool_full = keyword.len() >= limits.candidate_pool;

    let mut seen = HashSet::new();
    let semantic_hits = admit(semantic, filters, papers, &seen);
    let (semantic, semantic_capped) = finish(semantic_hits, limits.semantic_limit);

    // only papers actually shown as Smart Results shadow keyword hits
    seen.extend(semantic.iter().map(|hit| hit.paper_id.clone()));
    let keyword_hits = admit(keyword, filters, papers, &seen);
    let (keyword, keyword_capped) = finish(keyword_hits, limits.keyword_limit);

    MergedResults {
        semantic,
        keyword,
        semantic_completeness: completeness(semantic_capped || semantic_pool_full),
        keyword_completeness: completeness(keyword_capped || keyword_pool_full),
    }
}

fn completeness(capped: bool) -> Completeness {
    if capped {
        Completeness::Capped
    } else {
        Completeness::Exhausted
    }
}

fn admit(
    hits: Vec<SearchResult>,
    filters: &FilterSet,
    papers: &impl PaperLookup,
    seen: &HashSet<String>,
) -> Vec<MergedHit> {
    let mut ordered = hits;
    ordered.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.paper_id.cmp(&b.paper_id))
    });

    let mut taken = HashSet::new();
    let mut admitted = Vec::new();
    for hit in ordered {
        if seen.contains(&hit.paper_id) || taken.contains(&hit.paper_id) {
            continue;
        }
        let Some(paper) = papers.paper(&hit.paper_id) else {
            continue;
        };
        let Some(matched_filters) = filters.evaluate(paper) else {
            continue;
        };
        taken.insert(hit.paper_id.clone());
        admitted.push(MergedHit {
            rank: 0,
            paper_id: hit.paper_id,
            provenance: hit.provenance,
            relevance_score: hit.relevance_score,
            relevance: hit.relevance,
            matched_filters,
            paper: PaperSummary::from(paper),
        });
    }
    admitted
}

fn finish(mut hits: Vec<MergedHit>, limit: usize) -> (Vec<MergedHit>, bool) {
    let capped = hits.len() > limit;
    hits.truncate(limit);
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.rank = i + 1;
    }
    (hits, capped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filters::Filter;

    fn corpus(ids: &[&str]) -> HashMap<String, Paper> {
        ids.iter()
            .map(|id| (id.to_string(), Paper::new(*id, format!("Paper {}", id), "x")))
            .collect()
    }

    fn limits() -> MergeLimits {
        MergeLimits {
            semantic_limit: 6,
            keyword_limit: 10,
            candidate_pool: 200,
        }
    }

    #[test]
    fn test_overlap_stays_in_semantic_group() {
        let papers = corpus(&["a", "b", "c"]);
        let merged = merge(
            vec![SearchResult::semantic("a", 0.9), SearchResult::semantic("b", 0.8)],
            vec![SearchResult::keyword("b", 0.9), SearchResult::keyword("c", 0.4)],
            &FilterSet::new(),
            &papers,
            limits(),
        );
        let sem: Vec<&str> = merged.semantic.iter().map(|h| h.paper_id.as_str()).collect();
        let kw: Vec<&str> = merged.keyword.iter().map(|h| h.paper_id.as_str()).collect();
        assert_eq!(sem, vec!["a", "b"]);
        assert_eq!(kw, vec!["c"]);
        assert_eq!(merged.keyword[0].rank, 1);
        assert_eq!(merged.keyword[0].provenance, Provenance::Keyword);
    }

    #[test]
    fn test_groups_rank_independently_with_id_tiebreak() {
        let papers = corpus(&["a", "b", "c"]);
        let merged = merge(
            vec![],
            vec![
                SearchResult::keyword("c", 0.5),
                SearchResult::keyword("b", 0.5),
                SearchResult::keyword("a", 0.9),
            ],
            &FilterSet::new(),
            &papers,
            limits(),
        );
        let ranked: Vec<(usize, &str)> = merged
            .keyword
            .iter()
            .map(|h| (h.rank, h.paper_id.as_str()))
            .collect();
        assert_eq!(ranked, vec![(1, "a"), (2, "b"), (3, "c")]);
        assert!(merged.semantic.is_empty());
        assert_eq!(merged.semantic_completeness, Completeness::Exhausted);
    }

    #[test]
    fn test_limits_mark_group_capped() {
        let ids: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let papers = corpus(&refs);
        let merged = merge(
            refs.iter()
                .map(|id| SearchResult::semantic(*id, 0.5))
                .collect(),
            vec![],
            &FilterSet::new(),
            &papers,
            limits(),
        );
        assert_eq!(merged.semantic.len(), 6);
        assert_eq!(merged.semantic_completeness, Completeness::Capped);
        assert_eq!(merged.keyword_completeness, Completeness::Exhausted);
    }

    #[test]
    fn test_semantic_overflow_falls_back_to_keyword_group() {
        let ids: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let papers = corpus(&refs);
        let merged = merge(
            refs.iter()
                .enumerate()
                .map(|(i, id)| SearchResult::semantic(*id, 0.9 - i as f32 * 0.05))
                .collect(),
            vec![SearchResult::keyword("p7", 1.0), SearchResult::keyword("p0", 0.8)],
            &FilterSet::new(),
            &papers,
            limits(),
        );
        let sem: Vec<&str> = merged.semantic.iter().map(|h| h.paper_id.as_str()).collect();
        let kw: Vec<&str> = merged.keyword.iter().map(|h| h.paper_id.as_str()).collect();
        assert_eq!(sem, vec!["p0", "p1", "p2", "p3", "p4", "p5"]);
        assert_eq!(kw, vec!["p7"]);
        assert_eq!(merged.keyword[0].provenance, Provenance::Keyword);
        assert_eq!(merged.keyword[0].rank, 1);
        assert_eq!(merged.semantic_completeness, Completeness::Capped);
    }

    #[test]
    fn test_full_candidate_pool_is_capped() {
        let papers = corpus(&["a", "b"]);
        let merged = merge(
            vec![],
            vec![SearchResult::keyword("a", 0.5), SearchResult::keyword("b", 0.4)],
            &FilterSet::new(),
            &papers,
            MergeLimits {
                candidate_pool: 2,
                ..limits()
            },
        );
        assert_eq!(merged.keyword.len(), 2);
        assert_eq!(merged.keyword_completeness, Completeness::Capped);
    }

    #[test]
    fn test_filters_apply_to_both_groups() {
        let mut papers = corpus(&["a", "b"]);
        if let Some(paper) = papers.get_mut("b") {
            paper.github_urls = vec!["https://github.com/org/repo".to_string()];
        }
        let filters = FilterSet::new().with(Filter::HasGithubLink(true));
        let merged = merge(
            vec![SearchResult::semantic("a", 0.9)],
            vec![SearchResult::keyword("b", 0.3)],
            &filters,
            &papers,
            limits(),
        );
        assert!(merged.semantic.is_empty());
        assert_eq!(merged.keyword.len(), 1);
        assert_eq!(merged.keyword[0].matched_filters, vec!["has_github_link"]);
    }

    #[test]
    fn test_unknown_papers_are_dropped() {
        let papers = corpus(&["a"]);
        let merged = merge(
            vec![SearchResult::semantic("ghost", 0.99)],
            vec![SearchResult::keyword("a", 0.2)],
            &FilterSet::new(),
            &papers,
            limits(),
        );
        assert!(merged.semantic.is_empty());
        assert_eq!(merged.keyword[0].paper_id, "a");
    }
}
