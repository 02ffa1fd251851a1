//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a shareable client.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use crate::types::{ClientSettings, ProviderType};
use recall_core::{AppError, AppResult, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider settings.
///
/// # Errors
/// Returns error if the provider is unknown or the HTTP client cannot be built.
pub fn create_client(settings: &ClientSettings) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider).ok_or_else(|| {
        AppError::Config(format!("Unknown provider: {}", settings.provider))
    })?;

    match provider {
        ProviderType::Ollama => {
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(provider.default_endpoint());
            let retry = RetryPolicy::new(settings.max_attempts, Duration::from_millis(500));
            let client = OllamaClient::with_options(base_url, settings.timeout, retry)?;
            tracing::debug!(provider = provider.as_str(), base_url, "Created LLM client");
            Ok(Arc::new(client))
        }
    }
}
