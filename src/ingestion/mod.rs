//! Paper import pipeline.
//!
//! Loads paper records from a [`PaperProvider`] into a Paper Store. Crawling
//! and enrichment happen upstream; this pipeline only deduplicates, makes
//! sure every stored paper carries an embedding in the store's vector space,
//! and persists.
//!
//! # Usage Patterns
//!
//! ## Primary: Adding Papers to Existing Storage
//!
//! ```ignore
//! use paper_atlas::ingestion::ImportPipeline;
//! use paper_atlas::storage::sqlite::SqliteStorage;
//! use paper_atlas::embedding::openai::OpenAIEmbedding;
//! use paper_atlas::provider::json::JsonFilePaperProvider;
//!
//! let storage = SqliteStorage::open("papers.db")?;
//! let embedding_provider = OpenAIEmbedding::new(api_key, None);
//! let mut pipeline = ImportPipeline::connect(embedding_provider, storage, None).await?;
//!
//! let provider = JsonFilePaperProvider::from_file("new_papers.json").await?;
//! let stats = pipeline.ingest_from_provider(&provider).await?;
//! println!("Inserted: {}, Duplicates: {}", stats.inserted, stats.duplicates_skipped);
//! ```
//!
//! ## Secondary: Creating New Storage
//!
//! ```ignore
//! let storage = SqliteStorage::open("new_database.db")?;
//! let mut pipeline = ImportPipeline::initialize_new(embedding_provider, storage, None).await?;
//! pipeline.ingest_from_provider(&provider).await?;
//! ```

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{EmbeddingConfig, Paper};
use crate::provider::{PaperProvider, ProviderError};
use crate::storage::{PaperStorage, StorageError};

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Invalid input data or configuration mismatch
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate paper detected
    #[error("Duplicate paper: {0}")]
    Duplicate(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of input papers processed
    pub total_processed: usize,

    /// Number of papers successfully inserted
    pub inserted: usize,

    /// Number of papers skipped due to deduplication
    pub duplicates_skipped: usize,

    /// Number of papers that failed to process
    pub failed: usize,

    /// Inserted papers whose supplied vector was kept as-is
    pub embeddings_reused: usize,

    /// Inserted papers embedded by the pipeline
    pub embeddings_generated: usize,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inserted(&mut self) {
        self.total_processed += 1;
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }

    /// Fold another run's counts into this one.
    pub fn merge(&mut self, other: &IngestionStats) {
        self.total_processed += other.total_processed;
        self.inserted += other.inserted;
        self.duplicates_skipped += other.duplicates_skipped;
        self.failed += other.failed;
        self.embeddings_reused += other.embeddings_reused;
        self.embeddings_generated += other.embeddings_generated;
    }
}

/// Import pipeline coordinator.
///
/// Holds an embedding provider whose configuration matches the target store,
/// so vectors written here are comparable with query embeddings at search time.
pub struct ImportPipeline<E, S>
where
    E: EmbeddingProvider,
    S: PaperStorage,
{
    embedding_provider: E,
    storage: S,
    batch_size: usize,
}

impl<E, S> ImportPipeline<E, S>
where
    E: EmbeddingProvider,
    S: PaperStorage,
{
    /// Connect to an existing store and prepare for ingestion.
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if the store has no embedding
    /// configuration or the provider's model/dimension differs from it
    pub async fn connect(
        embedding_provider: E,
        storage: S,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        let stored_config = storage
            .get_config()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?
            .ok_or_else(|| {
                IngestionError::InvalidInput(
                    "Storage has no embedding configuration. Use initialize_new() for new storage."
                        .to_string(),
                )
            })?;

        let provider_config = embedding_provider.config();
        if provider_config.model_name != stored_config.model_name {
            return Err(IngestionError::InvalidInput(format!(
                "Embedding model mismatch: provider uses '{}' but storage has '{}'",
                provider_config.model_name, stored_config.model_name
            )));
        }
        if provider_config.dimension != stored_config.dimension {
            return Err(IngestionError::InvalidInput(format!(
                "Embedding dimension mismatch: provider has {} but storage has {}",
                provider_config.dimension, stored_config.dimension
            )));
        }

        Ok(Self::build(embedding_provider, storage, batch_size))
    }

    /// Initialize a new store with the given embedding provider's configuration.
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if the store already records a
    /// different embedding configuration
    pub async fn initialize_new(
        embedding_provider: E,
        storage: S,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        storage
            .initialize()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        let config = embedding_provider.config();
        if let Some(existing) = storage
            .get_config()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?
        {
            if existing != config {
                return Err(IngestionError::InvalidInput(format!(
                    "Storage already holds {}-dimensional '{}' embeddings",
                    existing.dimension, existing.model_name
                )));
            }
        }
        storage
            .store_config(&config)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        info!(
            "Initialized store for model={} dimension={}",
            config.model_name, config.dimension
        );
        Ok(Self::build(embedding_provider, storage, batch_size))
    }

    fn build(embedding_provider: E, storage: S, batch_size: Option<usize>) -> Self {
        Self {
            embedding_provider,
            storage,
            batch_size: batch_size.unwrap_or(100).max(1),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Normalized title used as the deduplication key.
    pub fn normalize_title(title: &str) -> String {
        normalize_text(title)
    }

    /// Ingest a batch of papers.
    ///
    /// Per chunk: skip titles already stored, keep supplied embeddings whose
    /// dimension matches the store, embed the remaining abstracts in one call,
    /// then insert. Insert failures are counted, not fatal.
    ///
    /// # Errors
    /// Returns `IngestionError` if storage lookups or embedding generation fail
    pub async fn ingest_batch(&mut self, papers: &[Paper]) -> IngestionResult<IngestionStats> {
        let mut stats = IngestionStats::new();
        let dimension = self.embedding_provider.dimension();

        for chunk in papers.chunks(self.batch_size) {
            let mut ready: Vec<Paper> = Vec::new();
            let mut needs_embedding: Vec<Paper> = Vec::new();

            for paper in chunk {
                let normalized_title = Self::normalize_title(&paper.title);
                if normalized_title.is_empty() {
                    warn!("Skipping paper {} with an empty title", paper.id);
                    stats.record_failed();
                    continue;
                }

                let exists = self
                    .storage
                    .exists_by_title(&normalized_title)
                    .await
                    .map_err(|e| IngestionError::StorageError(e.to_string()))?;
                if exists {
                    debug!("Duplicate title skipped: {}", paper.title);
                    stats.record_duplicate();
                    continue;
                }

                match &paper.embedding {
                    Some(vector) if vector.len() == dimension => ready.push(paper.clone()),
                    Some(vector) => {
                        warn!(
                            "Paper {}: supplied embedding has dimension {}, expected {}; re-embedding",
                            paper.id,
                            vector.len(),
                            dimension
                        );
                        needs_embedding.push(paper.clone());
                    }
                    None => needs_embedding.push(paper.clone()),
                }
            }

            let reused = ready.len();
            let mut generated = Vec::new();
            let (embeddable, unembeddable): (Vec<Paper>, Vec<Paper>) = needs_embedding
                .into_iter()
                .partition(|p| !p.abstract_text.trim().is_empty());
            for paper in unembeddable {
                warn!("Paper {} has no abstract and no embedding", paper.id);
                stats.record_failed();
            }

            if !embeddable.is_empty() {
                let abstract_texts: Vec<String> = embeddable
                    .iter()
                    .map(|p| normalize_text(&p.abstract_text))
                    .collect();
                let abstract_refs: Vec<&str> = abstract_texts.iter().map(|s| s.as_str()).collect();

                let embeddings = self
                    .embedding_provider
                    .embed_batch(&abstract_refs)
                    .await
                    .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?;
                if embeddings.len() != embeddable.len() {
                    return Err(IngestionError::EmbeddingError(format!(
                        "provider returned {} embeddings for {} abstracts",
                        embeddings.len(),
                        embeddable.len()
                    )));
                }

                for (mut paper, embedding) in embeddable.into_iter().zip(embeddings) {
                    paper.embedding = Some(embedding);
                    generated.push(paper);
                }
            }

            for (paper, was_generated) in ready
                .into_iter()
                .map(|p| (p, false))
                .chain(generated.into_iter().map(|p| (p, true)))
            {
                match self.storage.insert_paper(&paper).await {
                    Ok(()) => {
                        stats.record_inserted();
                        if was_generated {
                            stats.embeddings_generated += 1;
                        } else {
                            stats.embeddings_reused += 1;
                        }
                    }
                    Err(StorageError::DuplicateEntry(detail)) => {
                        debug!("Duplicate within input skipped: {}", detail);
                        stats.record_duplicate();
                    }
                    Err(e) => {
                        warn!("Failed to insert paper '{}': {}", paper.title, e);
                        stats.record_failed();
                    }
                }
            }
            debug!(reused, "Chunk processed");
        }

        Ok(stats)
    }

    /// Ingest a single paper, returning its id.
    ///
    /// # Errors
    /// Returns `IngestionError::Duplicate` if the title is already stored
    pub async fn ingest_single(&mut self, paper: &Paper) -> IngestionResult<String> {
        let normalized_title = Self::normalize_title(&paper.title);
        let exists = self
            .storage
            .exists_by_title(&normalized_title)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;
        if exists {
            return Err(IngestionError::Duplicate(format!(
                "Paper with title '{}' already exists",
                paper.title
            )));
        }

        let mut stored = paper.clone();
        let dimension = self.embedding_provider.dimension();
        if stored.embedding.as_ref().map(|v| v.len()) != Some(dimension) {
            if stored.abstract_text.trim().is_empty() {
                return Err(IngestionError::InvalidInput(format!(
                    "Paper {} has no abstract to embed",
                    paper.id
                )));
            }
            let embedding = self
                .embedding_provider
                .embed(&normalize_text(&stored.abstract_text))
                .await
                .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?;
            stored.embedding = Some(embedding);
        }

        self.storage.insert_paper(&stored).await.map_err(|e| match e {
            StorageError::DuplicateEntry(detail) => IngestionError::Duplicate(detail),
            other => IngestionError::StorageError(other.to_string()),
        })?;
        Ok(stored.id)
    }

    /// Ingest everything a provider supplies.
    pub async fn ingest_from_provider<P>(&mut self, provider: &P) -> IngestionResult<IngestionStats>
    where
        P: PaperProvider + ?Sized,
    {
        let papers = provider.fetch_papers().await?;
        info!("Fetched {} papers from {}", papers.len(), provider.name());
        self.ingest_batch(&papers).await
    }

    /// The configuration this pipeline writes with.
    pub fn embedding_config(&self) -> EmbeddingConfig {
        self.embedding_provider.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::storage::memory::InMemoryStorage;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    // ===== Mock Implementations =====

    #[derive(Clone)]
    struct MockEmbeddingProvider {
        model_name: String,
        dimension: usize,
        state: Arc<Mutex<MockEmbeddingState>>,
    }

    #[derive(Default)]
    struct MockEmbeddingState {
        embed_calls: Vec<String>,
        embed_batch_calls: Vec<Vec<String>>,
        should_fail: bool,
    }

    impl MockEmbeddingProvider {
        fn new(model_name: &str, dimension: usize) -> Self {
            Self {
                model_name: model_name.to_string(),
                dimension,
                state: Arc::new(Mutex::new(MockEmbeddingState::default())),
            }
        }

        fn with_failure(self) -> Self {
            self.state.lock().unwrap().should_fail = true;
            self
        }

        fn embed_calls(&self) -> Vec<String> {
            self.state.lock().unwrap().embed_calls.clone()
        }

        fn embed_batch_calls(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().embed_batch_calls.clone()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut state = self.state.lock().unwrap();
            state.embed_calls.push(text.to_string());
            if state.should_fail {
                return Err(EmbeddingError::ApiError("Mock embed failure".to_string()));
            }
            Ok(vec![0.5; self.dimension])
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut state = self.state.lock().unwrap();
            state
                .embed_batch_calls
                .push(texts.iter().map(|s| s.to_string()).collect());
            if state.should_fail {
                return Err(EmbeddingError::ApiError("Mock embed_batch failure".to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }

    struct MockPaperProvider {
        papers: Vec<Paper>,
        should_fail: bool,
    }

    #[async_trait]
    impl PaperProvider for MockPaperProvider {
        async fn fetch_papers(&self) -> Result<Vec<Paper>, ProviderError> {
            if self.should_fail {
                return Err(ProviderError::Other("Mock provider failure".to_string()));
            }
            Ok(self.papers.clone())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn paper(id: &str, title: &str) -> Paper {
        Paper::new(id, title, format!("Abstract of {}", title))
    }

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: "mock".to_string(),
            dimension: 4,
        }
    }

    // ===== connect / initialize_new =====

    #[tokio::test]
    async fn test_connect_requires_stored_config() {
        let result = ImportPipeline::connect(
            MockEmbeddingProvider::new("mock", 4),
            InMemoryStorage::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(IngestionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_dimension_mismatch() {
        let storage = InMemoryStorage::new();
        storage.store_config(&test_config()).await.unwrap();

        let result =
            ImportPipeline::connect(MockEmbeddingProvider::new("mock", 8), storage, None).await;
        match result {
            Err(IngestionError::InvalidInput(msg)) => assert!(msg.contains("dimension")),
            _ => panic!("expected dimension mismatch"),
        }
    }

    #[tokio::test]
    async fn test_initialize_new_stores_config() {
        let pipeline = ImportPipeline::initialize_new(
            MockEmbeddingProvider::new("mock", 4),
            InMemoryStorage::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(
            pipeline.storage().get_config().await.unwrap(),
            Some(test_config())
        );
    }

    #[tokio::test]
    async fn test_initialize_new_refuses_foreign_config() {
        let storage = InMemoryStorage::new();
        storage
            .store_config(&EmbeddingConfig {
                model_name: "other".to_string(),
                dimension: 4,
            })
            .await
            .unwrap();
        let result =
            ImportPipeline::initialize_new(MockEmbeddingProvider::new("mock", 4), storage, None)
                .await;
        assert!(matches!(result, Err(IngestionError::InvalidInput(_))));
    }

    // ===== ingest_batch =====

    #[tokio::test]
    async fn test_batch_dedupes_against_store_and_within_input() {
        let storage = InMemoryStorage::with_papers(vec![paper("old", "Existing Paper")]);
        storage.store_config(&test_config()).await.unwrap();
        let mut pipeline =
            ImportPipeline::connect(MockEmbeddingProvider::new("mock", 4), storage, None)
                .await
                .unwrap();

        let stats = pipeline
            .ingest_batch(&[
                paper("a", "existing   paper"),
                paper("b", "Fresh Paper"),
                paper("c", "FRESH paper"),
            ])
            .await
            .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.duplicates_skipped, 2);
        assert_eq!(stats.total_processed, 3);
        assert_eq!(pipeline.storage().count_papers().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_supplied_embeddings_are_kept() {
        let provider = MockEmbeddingProvider::new("mock", 4);
        let mut pipeline =
            ImportPipeline::initialize_new(provider.clone(), InMemoryStorage::new(), None)
                .await
                .unwrap();

        let mut with_vector = paper("a", "Has Vector");
        with_vector.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        let mut wrong_size = paper("b", "Wrong Size");
        wrong_size.embedding = Some(vec![1.0, 0.0]);
        let missing = paper("c", "Missing Vector");

        let stats = pipeline
            .ingest_batch(&[with_vector, wrong_size, missing])
            .await
            .unwrap();

        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.embeddings_reused, 1);
        assert_eq!(stats.embeddings_generated, 2);

        let calls = provider.embed_batch_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        assert_eq!(calls[0][0], "abstract of wrong size");

        let kept = pipeline.storage().get_paper_by_id("a").await.unwrap();
        assert_eq!(kept.embedding, Some(vec![1.0, 0.0, 0.0, 0.0]));
        let fixed = pipeline.storage().get_paper_by_id("b").await.unwrap();
        assert_eq!(fixed.embedding.map(|v| v.len()), Some(4));
    }

    #[tokio::test]
    async fn test_batch_respects_batch_size() {
        let provider = MockEmbeddingProvider::new("mock", 4);
        let mut pipeline =
            ImportPipeline::initialize_new(provider.clone(), InMemoryStorage::new(), Some(2))
                .await
                .unwrap();
        let papers: Vec<Paper> = (0..5)
            .map(|i| paper(&format!("p{}", i), &format!("Paper {}", i)))
            .collect();

        let stats = pipeline.ingest_batch(&papers).await.unwrap();
        assert_eq!(stats.inserted, 5);
        let sizes: Vec<usize> = provider.embed_batch_calls().iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_missing_abstract_without_vector_fails_record() {
        let mut pipeline = ImportPipeline::initialize_new(
            MockEmbeddingProvider::new("mock", 4),
            InMemoryStorage::new(),
            None,
        )
        .await
        .unwrap();
        let stats = pipeline
            .ingest_batch(&[Paper::new("a", "No Abstract", "  "), paper("b", "Fine")])
            .await
            .unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.inserted, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let mut pipeline = ImportPipeline::initialize_new(
            MockEmbeddingProvider::new("mock", 4).with_failure(),
            InMemoryStorage::new(),
            None,
        )
        .await
        .unwrap();
        let result = pipeline.ingest_batch(&[paper("a", "A")]).await;
        assert!(matches!(result, Err(IngestionError::EmbeddingError(_))));
    }

    // ===== ingest_single / ingest_from_provider =====

    #[tokio::test]
    async fn test_ingest_single() {
        let provider = MockEmbeddingProvider::new("mock", 4);
        let mut pipeline =
            ImportPipeline::initialize_new(provider.clone(), InMemoryStorage::new(), None)
                .await
                .unwrap();

        let id = pipeline.ingest_single(&paper("a", "Solo")).await.unwrap();
        assert_eq!(id, "a");
        assert_eq!(provider.embed_calls(), vec!["abstract of solo".to_string()]);

        let dup = pipeline.ingest_single(&paper("b", "solo")).await;
        assert!(matches!(dup, Err(IngestionError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_ingest_from_provider() {
        let mut pipeline = ImportPipeline::initialize_new(
            MockEmbeddingProvider::new("mock", 4),
            InMemoryStorage::new(),
            None,
        )
        .await
        .unwrap();

        let provider = MockPaperProvider {
            papers: vec![paper("a", "A"), paper("b", "B")],
            should_fail: false,
        };
        let stats = pipeline.ingest_from_provider(&provider).await.unwrap();
        assert_eq!(stats.inserted, 2);

        let failing = MockPaperProvider {
            papers: vec![],
            should_fail: true,
        };
        let result = pipeline.ingest_from_provider(&failing).await;
        assert!(matches!(result, Err(IngestionError::ProviderError(_))));
    }

    #[test]
    fn test_stats_merge() {
        let mut total = IngestionStats::new();
        let mut run = IngestionStats::new();
        run.record_inserted();
        run.record_duplicate();
        total.merge(&run);
        total.merge(&run);
        assert_eq!(total.total_processed, 4);
        assert_eq!(total.inserted, 2);
    }
}
