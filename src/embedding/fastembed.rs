//! Local embedding generation with fastembed (feature `fastembed`).
//!
//! Runs ONNX sentence-embedding models in-process, so query embedding does
//! not depend on a remote API being reachable.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// FastEmbed model instance shared behind an async mutex.
#[derive(Clone)]
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    embedding_dimension: usize,
}

impl FastEmbedProvider {
    /// Load a model, defaulting to AllMiniLML6V2.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the model cannot be initialized
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<String>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(EmbeddingModel::AllMiniLML6V2);
        let model_name = format!("{:?}", model_type);

        let embedding_dimension = match model_type {
            EmbeddingModel::BGEBaseENV15 => 768,
            EmbeddingModel::BGELargeENV15 => 1024,
            EmbeddingModel::NomicEmbedTextV1 | EmbeddingModel::NomicEmbedTextV15 => 768,
            EmbeddingModel::ParaphraseMLMpnetBaseV2 => 768,
            _ => 384,
        };

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(PathBuf::from(dir));
        }

        let text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "All texts must be non-empty".to_string(),
            ));
        }

        let owned: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        #[allow(unused_mut)]
        let mut model = self.model.lock().await;
        model
            .embed(owned, None)
            .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Downloads model weights; run with `--features fastembed -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_related_texts_are_closer() {
        let provider = FastEmbedProvider::new(None, None).unwrap();
        assert_eq!(provider.dimension(), 384);

        let vectors = provider
            .embed_batch(&[
                "compressing the kv cache of transformer decoders",
                "efficient attention for on-device inference",
                "dental radiograph segmentation",
            ])
            .await
            .unwrap();

        let related = crate::embedding::cosine_similarity(&vectors[0], &vectors[1]);
        let unrelated = crate::embedding::cosine_similarity(&vectors[0], &vectors[2]);
        assert!(related > unrelated);
    }
}
