//! Embedding provider abstraction and implementations.
//!
//! Paper vectors are produced outside the search core; this module supplies
//! the query side (embedding a search query or learning-path topic into the
//! same space) and the ingestion side for records that arrive without a vector.
//!
//! The abstraction allows the system to swap between different embedding models
//! without changing the core logic of ingestion or search.

#[cfg(feature = "fastembed")]
pub mod fastembed;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingSettings;
use crate::models::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty, too long)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors of this trait can generate vector embeddings from text inputs.
/// The trait is async to support API-based embedding services.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text (should be pre-normalized).
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// Returns vectors in the same order as the input texts.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> usize;

    /// Get the model name/identifier for this provider.
    fn model_name(&self) -> &str;

    /// The configuration a Paper Store must carry to be searchable with this provider.
    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: self.model_name().to_string(),
            dimension: self.dimension(),
        }
    }
}

#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<T> {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Normalizes text for consistent embedding generation.
///
/// This function applies the following transformations:
/// - Converts to lowercase
/// - Trims leading/trailing whitespace
/// - Collapses multiple consecutive spaces to a single space
///
/// # Example
/// ```
/// use paper_atlas::embedding::normalize_text;
/// assert_eq!(normalize_text("  Hello   World  "), "hello world");
/// ```
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute cosine similarity between two vectors.
///
/// Mismatched lengths and zero-magnitude vectors score 0.0 instead of
/// panicking, since stored vectors come from an external producer.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Build the query-side provider named in the configuration.
///
/// When the Paper Store already records an embedding configuration, the
/// provider must match it; a mismatch would silently produce meaningless
/// similarities.
pub fn provider_from_settings(
    settings: &EmbeddingSettings,
    stored: Option<&EmbeddingConfig>,
) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match settings.provider.as_str() {
        "openai" => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                EmbeddingError::ConfigError(
                    "OPENAI_API_KEY is required for the openai embedding provider".to_string(),
                )
            })?;
            let model = settings
                .model
                .clone()
                .or_else(|| stored.map(|c| c.model_name.clone()));
            Arc::new(openai::OpenAIEmbedding::new(api_key, model))
        }
        #[cfg(feature = "fastembed")]
        "fastembed" => Arc::new(fastembed::FastEmbedProvider::new(
            None,
            settings.cache_dir.clone(),
        )?),
        other => {
            return Err(EmbeddingError::ConfigError(format!(
                "Unsupported embedding provider '{}'",
                other
            )))
        }
    };

    if let Some(stored) = stored {
        if stored.dimension != provider.dimension() {
            return Err(EmbeddingError::ConfigError(format!(
                "Dimension mismatch: store expects {} but provider '{}' returns {}",
                stored.dimension,
                provider.model_name(),
                provider.dimension()
            )));
        }
    }

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Hello World"), "hello world");
        assert_eq!(normalize_text("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(normalize_text("UPPERCASE"), "uppercase");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_provider_from_settings_requires_api_key() {
        let settings = EmbeddingSettings {
            provider: "openai".to_string(),
            ..EmbeddingSettings::default()
        };
        let err = provider_from_settings(&settings, None).err().unwrap();
        assert!(matches!(err, EmbeddingError::ConfigError(_)));
    }

    #[test]
    fn test_provider_from_settings_checks_dimension() {
        let settings = EmbeddingSettings {
            provider: "openai".to_string(),
            model: Some("text-embedding-3-small".to_string()),
            api_key: Some("sk-test".to_string()),
            cache_dir: None,
        };
        let stored = EmbeddingConfig {
            model_name: "text-embedding-3-small".to_string(),
            dimension: 384,
        };
        let err = provider_from_settings(&settings, Some(&stored)).err().unwrap();
        assert!(err.to_string().contains("Dimension mismatch"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let settings = EmbeddingSettings {
            provider: "word2vec".to_string(),
            ..EmbeddingSettings::default()
        };
        assert!(provider_from_settings(&settings, None).is_err());
    }
}
