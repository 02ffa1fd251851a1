//! Embedding providers for dense retrieval.

pub mod ollama;
pub mod trigram;

pub use ollama::OllamaEmbeddings;
pub use trigram::TrigramEmbeddings;

use recall_core::config::RetrievalSettings;
use recall_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "trigram", "ollama")
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Retrieval("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from retrieval settings.
///
/// `endpoint` is the inference server URL, shared with the LLM settings.
pub fn create_provider(
    settings: &RetrievalSettings,
    endpoint: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.embedding_provider.as_str() {
        "trigram" => Ok(Arc::new(TrigramEmbeddings::new(
            settings.embedding_dimensions,
        ))),
        "ollama" => Ok(Arc::new(OllamaEmbeddings::new(
            endpoint.unwrap_or(ollama::DEFAULT_OLLAMA_URL),
            &settings.embedding_model,
            settings.embedding_dimensions,
            timeout,
        )?)),
        other => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram, ollama",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_trigram_provider() {
        let settings = RetrievalSettings::default();
        let provider = create_provider(&settings, None, Duration::from_secs(5)).unwrap();
        assert_eq!(provider.provider_name(), "trigram");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn test_create_ollama_provider_without_contacting_server() {
        let settings = RetrievalSettings {
            embedding_provider: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            ..Default::default()
        };
        let provider = create_provider(&settings, None, Duration::from_secs(5)).unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_create_unknown_provider() {
        let settings = RetrievalSettings {
            embedding_provider: "word2vec".to_string(),
            ..Default::default()
        };
        let result = create_provider(&settings, None, Duration::from_secs(5));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));
    }
}
