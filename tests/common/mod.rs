//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use paper_atlas::{
    config::{DiscoverySettings, SearchSettings},
    discovery::{DiscoveryScorer, DiscoveryViewService, ScoreSnapshot, SnapshotStore},
    embedding::{EmbeddingError, EmbeddingProvider, EmbeddingResult},
    models::{Paper, PublishedDate},
    query::{HybridSearchService, QueryRouter},
};

/// Cue words per concept axis; the last axis catches text with no cues.
const CONCEPTS: &[&[&str]] = &[
    &[
        "efficient",
        "mobile",
        "deployment",
        "memory",
        "compression",
        "cache",
        "latency",
        "inference",
    ],
    &["attention", "transformer", "kv", "key-value"],
    &["vision", "language", "image", "visual", "multimodal", "caption"],
    &["protein", "molecule", "genome"],
];

/// Bag-of-concepts vector: one axis per concept, counting cue occurrences.
pub fn concept_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    let mut vector: Vec<f32> = CONCEPTS
        .iter()
        .map(|cues| cues.iter().map(|cue| text.matches(cue).count()).sum::<usize>() as f32)
        .collect();
    let empty = vector.iter().all(|v| *v == 0.0);
    vector.push(if empty { 1.0 } else { 0.0 });
    vector
}

/// Deterministic embedder over [`concept_vector`].
pub struct ConceptEmbedder;

#[async_trait]
impl EmbeddingProvider for ConceptEmbedder {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(concept_vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| concept_vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len() + 1
    }

    fn model_name(&self) -> &str {
        "concept-test"
    }
}

/// Embedder whose every call fails, as an unreachable API would.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
        Err(EmbeddingError::ApiError("connection refused".to_string()))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Err(EmbeddingError::ApiError("connection refused".to_string()))
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len() + 1
    }

    fn model_name(&self) -> &str {
        "concept-test"
    }
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> PublishedDate {
    PublishedDate::known(now() - Duration::days(days))
}

/// A paper whose embedding is the concept vector of its title and abstract.
pub fn paper(id: &str, title: &str, abstract_text: &str) -> Paper {
    let mut paper = Paper::new(id, title, abstract_text);
    paper.embedding = Some(concept_vector(&format!("{} {}", title, abstract_text)));
    paper
}

pub fn snapshot_store(papers: Vec<Paper>) -> Arc<SnapshotStore> {
    let scored = DiscoveryScorer::new().score_all(papers, now());
    Arc::new(SnapshotStore::new(ScoreSnapshot::build(1, now(), scored)))
}

pub fn search_service(
    snapshots: &Arc<SnapshotStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> HybridSearchService {
    HybridSearchService::new(
        Arc::clone(snapshots),
        embedder,
        QueryRouter::new(SearchSettings::default()),
    )
}

pub fn discovery_service(
    snapshots: &Arc<SnapshotStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> DiscoveryViewService {
    DiscoveryViewService::new(Arc::clone(snapshots), embedder, DiscoverySettings::default())
}

pub fn concept_embedder() -> Option<Arc<dyn EmbeddingProvider>> {
    Some(Arc::new(ConceptEmbedder))
}

/// A small mixed corpus used by the API tests.
pub fn corpus() -> Vec<Paper> {
    let mut kv = paper(
        "2401.00001",
        "Paged KV Cache Compression for Small Devices",
        "We compress key-value caches of decoder-only models so they fit on phones with little memory.",
    );
    kv.category = "cs.LG".to_string();
    kv.citation_count = 120;
    kv.published = days_ago(90);
    kv.github_urls = vec!["https://github.com/example/paged-kv".to_string()];
    kv.has_deep_analysis = true;

    let mut graph = paper(
        "2401.00002",
        "Attention in Graph Networks",
        "Message passing with attention over sparse neighbourhoods.",
    );
    graph.category = "cs.LG".to_string();
    graph.citation_count = 40;
    graph.published = days_ago(400);

    let mut survey = paper(
        "2401.00003",
        "A Survey of Vision Language Models",
        "An overview of image and text models.",
    );
    survey.category = "cs.CV".to_string();
    survey.citation_count = 900;
    survey.published = days_ago(200);

    let mut protein = paper(
        "2401.00004",
        "Protein Folding with Diffusion",
        "Structure prediction for protein chains.",
    );
    protein.category = "q-bio.BM".to_string();

    vec![kv, graph, survey, protein]
}
