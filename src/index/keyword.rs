//! Inverted keyword index.
//!
//! Each term maps to the papers containing it and a field weight: title
//! matches count double, abstract and category once each. A paper's score is
//! the summed weight of the distinct query terms it contains, divided by the
//! best achievable total, so scores fall in (0, 1].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use super::{rank_hits, IndexError, IndexResult, KeywordIndex};
use crate::models::{Paper, SearchResult};

const TITLE_WEIGHT: f32 = 2.0;
const ABSTRACT_WEIGHT: f32 = 1.0;
const CATEGORY_WEIGHT: f32 = 1.0;
const MAX_TERM_WEIGHT: f32 = TITLE_WEIGHT + ABSTRACT_WEIGHT + CATEGORY_WEIGHT;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "into", "is",
    "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "via", "we", "what",
    "which", "with",
];

/// Split text into lowercase index terms.
///
/// Non-alphanumeric characters separate terms, stopwords are dropped and a
/// trailing plural `s` is stripped from longer words ("models" → "model").
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(stem)
        .collect()
}

fn stem(term: &str) -> String {
    if term.len() > 3 && term.ends_with('s') && !term.ends_with("ss") {
        term[..term.len() - 1].to_string()
    } else {
        term.to_string()
    }
}

type Postings = HashMap<String, HashMap<String, f32>>;

/// Term → (paper id → field weight).
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: Arc<Postings>,
    documents: usize,
}

impl InvertedIndex {
    pub fn build<'a>(papers: impl IntoIterator<Item = &'a Paper>) -> Self {
        let mut postings = Postings::new();
        let mut documents = 0;
        for paper in papers {
            add(&mut postings, paper);
            documents += 1;
        }
        Self {
            postings: Arc::new(postings),
            documents,
        }
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Score synchronously on the calling thread.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        score(&self.postings, query, limit)
    }
}

fn add(postings: &mut Postings, paper: &Paper) {
    let mut weights: HashMap<String, f32> = HashMap::new();
    for (text, weight) in [
        (paper.title.as_str(), TITLE_WEIGHT),
        (paper.abstract_text.as_str(), ABSTRACT_WEIGHT),
        (paper.category.as_str(), CATEGORY_WEIGHT),
    ] {
        let terms: BTreeSet<String> = tokenize(text).into_iter().collect();
        for term in terms {
            *weights.entry(term).or_default() += weight;
        }
    }
    for (term, weight) in weights {
        postings
            .entry(term)
            .or_default()
            .insert(paper.id.clone(), weight);
    }
}

fn score(postings: &Postings, query: &str, limit: usize) -> Vec<SearchResult> {
    let terms: BTreeSet<String> = tokenize(query).into_iter().collect();
    if terms.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scores: HashMap<&str, f32> = HashMap::new();
    for term in &terms {
        if let Some(posting) = postings.get(term) {
            for (id, weight) in posting {
                *scores.entry(id.as_str()).or_default() += weight;
            }
        }
    }

    let best = terms.len() as f32 * MAX_TERM_WEIGHT;
    let mut hits: Vec<SearchResult> = scores
        .into_iter()
        .map(|(id, total)| SearchResult::keyword(id, total / best))
        .collect();
    rank_hits(&mut hits, limit);
    hits
}

#[async_trait]
impl KeywordIndex for InvertedIndex {
    /// Scores on the blocking pool; the scan is linear in posting size.
    async fn lookup(&self, query: &str, limit: usize) -> IndexResult<Vec<SearchResult>> {
        let postings = Arc::clone(&self.postings);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || score(&postings, &query, limit))
            .await
            .map_err(|e| IndexError::Other(format!("keyword scoring task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Paper> {
        let mut a = Paper::new(
            "a",
            "Efficient Attention for Mobile Deployment",
            "We prune attention heads.",
        );
        a.category = "cs.LG".to_string();
        let b = Paper::new("b", "Graph Networks", "Message passing with attention.");
        let c = Paper::new("c", "Paged KV Cache", "Key-value cache paging for decoders.");
        vec![a, b, c]
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Efficient attention mechanisms, for MOBILE deployment!"),
            vec!["efficient", "attention", "mechanism", "mobile", "deployment"]
        );
        assert_eq!(tokenize("the of and"), Vec::<String>::new());
        assert_eq!(tokenize("glass class"), vec!["glass", "class"]);
    }

    #[test]
    fn test_title_matches_outrank_abstract_matches() {
        let index = InvertedIndex::build(&corpus());
        let hits = index.search("attention", 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].relevance_score > hits[1].relevance_score);
        assert!(hits.iter().all(|h| h.relevance_score <= 1.0));
    }

    #[test]
    fn test_requires_literal_term() {
        let index = InvertedIndex::build(&corpus());
        let hits = index.search("efficient attention mechanisms for mobile deployment", 10);
        assert!(hits.iter().all(|h| h.paper_id != "c"));
    }

    #[test]
    fn test_ties_break_by_id_and_limit_applies() {
        let papers = vec![
            Paper::new("z", "Transformers", "x"),
            Paper::new("y", "Transformers again", "x"),
        ];
        let index = InvertedIndex::build(&papers);
        let hits = index.search("transformer", 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].paper_id, "y");
    }

    #[tokio::test]
    async fn test_lookup_labels_provenance() {
        let index = InvertedIndex::build(&corpus());
        let hits = index.lookup("cache", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].provenance, crate::models::Provenance::Keyword);
        assert!(index.lookup("", 5).await.unwrap().is_empty());
    }
}
