//! Brute-force semantic index.
//!
//! Embeds the query with the same provider the corpus was embedded with and
//! scores every stored vector by cosine similarity. The scan is linear in
//! corpus size and runs on the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{rank_hits, IndexError, IndexResult, SemanticIndex};
use crate::embedding::{cosine_similarity, normalize_text, EmbeddingProvider};
use crate::models::{Paper, SearchResult};

/// Paper vectors of one corpus state, in id order.
#[derive(Debug, Default)]
pub struct VectorStore {
    entries: Vec<(String, Vec<f32>)>,
    dimension: Option<usize>,
}

impl VectorStore {
    /// Collect vectors from papers. Papers without an embedding, or whose
    /// vector length differs from the first one seen, are left out.
    pub fn build<'a>(papers: impl IntoIterator<Item = &'a Paper>) -> Self {
        let mut entries: Vec<(String, Vec<f32>)> = Vec::new();
        let mut dimension = None;
        for paper in papers {
            let Some(vector) = paper.embedding.as_ref().filter(|v| !v.is_empty()) else {
                continue;
            };
            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    debug!(
                        "Skipping vector for {}: dimension {} != {}",
                        paper.id,
                        vector.len(),
                        d
                    );
                    continue;
                }
                Some(_) => {}
            }
            entries.push((paper.id.clone(), vector.clone()));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries, dimension }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Score every vector against `query_vector`.
    pub fn nearest_to(&self, query_vector: &[f32], limit: usize, min_score: f32) -> Vec<SearchResult> {
        let mut hits: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|(id, vector)| (id, cosine_similarity(query_vector, vector)))
            .filter(|(_, score)| *score >= min_score)
            .map(|(id, score)| SearchResult::semantic(id.clone(), score))
            .collect();
        rank_hits(&mut hits, limit);
        hits
    }
}

/// Semantic index over a [`VectorStore`], embedding queries on demand.
///
/// Without a provider the index reports itself unavailable, which the router
/// turns into a degraded response.
#[derive(Clone)]
pub struct EmbeddingSemanticIndex {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    vectors: Arc<VectorStore>,
}

impl EmbeddingSemanticIndex {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>, vectors: Arc<VectorStore>) -> Self {
        Self { provider, vectors }
    }
}

#[async_trait]
impl SemanticIndex for EmbeddingSemanticIndex {
    async fn nearest(
        &self,
        query: &str,
        limit: usize,
        min_score: f32,
    ) -> IndexResult<Vec<SearchResult>> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| IndexError::Unavailable("no query embedding provider".to_string()))?;

        if let Some(dimension) = self.vectors.dimension() {
            if dimension != provider.dimension() {
                return Err(IndexError::Unavailable(format!(
                    "query embeddings have dimension {} but paper vectors have {}",
                    provider.dimension(),
                    dimension
                )));
            }
        }

        let query_vector = provider
            .embed(&normalize_text(query))
            .await
            .map_err(|e| IndexError::EmbeddingError(e.to_string()))?;

        let vectors = Arc::clone(&self.vectors);
        tokio::task::spawn_blocking(move || vectors.nearest_to(&query_vector, limit, min_score))
            .await
            .map_err(|e| IndexError::Other(format!("similarity scan failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult};

    /// Embeds by looking the text up in a fixed table.
    struct TableEmbedder {
        table: Vec<(&'static str, Vec<f32>)>,
    }

    #[async_trait]
    impl EmbeddingProvider for TableEmbedder {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            self.table
                .iter()
                .find(|(key, _)| *key == text)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EmbeddingError::InvalidInput(text.to_string()))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    fn paper_with(id: &str, vector: Vec<f32>) -> Paper {
        let mut paper = Paper::new(id, id, "abstract");
        paper.embedding = Some(vector);
        paper
    }

    fn store() -> Arc<VectorStore> {
        Arc::new(VectorStore::build(&[
            paper_with("near", vec![1.0, 0.1]),
            paper_with("far", vec![0.0, 1.0]),
            paper_with("mid", vec![1.0, 1.0]),
            paper_with("odd", vec![1.0, 0.0, 0.0]),
            Paper::new("none", "none", "abstract"),
        ]))
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(TableEmbedder {
            table: vec![("kv cache", vec![1.0, 0.0])],
        })
    }

    #[test]
    fn test_build_skips_missing_and_mismatched_vectors() {
        let vectors = store();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors.dimension(), Some(2));
    }

    #[tokio::test]
    async fn test_nearest_orders_and_thresholds() {
        let index = EmbeddingSemanticIndex::new(Some(embedder()), store());
        let hits = index.nearest("  KV   Cache ", 10, 0.5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].relevance.is_some());
    }

    #[tokio::test]
    async fn test_missing_provider_is_unavailable() {
        let index = EmbeddingSemanticIndex::new(None, store());
        let err = index.nearest("kv cache", 10, 0.0).await.unwrap_err();
        assert!(matches!(err, IndexError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported() {
        let index = EmbeddingSemanticIndex::new(Some(embedder()), store());
        let err = index.nearest("unknown text", 10, 0.0).await.unwrap_err();
        assert!(matches!(err, IndexError::EmbeddingError(_)));
    }
}
