//! Provider identification and client construction settings.

use recall_core::config::LlmSettings;
use std::time::Duration;

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
        }
    }

    /// Endpoint used when none is configured.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
        }
    }
}

/// Everything the factory needs to build a client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub provider: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,

    /// Per-request HTTP timeout
    pub timeout: Duration,

    /// Attempts per request on transient failures
    pub max_attempts: u32,
}

impl ClientSettings {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            endpoint: None,
            api_key: None,
            timeout: Duration::from_secs(120),
            max_attempts: 3,
        }
    }
}

impl From<&LlmSettings> for ClientSettings {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            provider: settings.provider.clone(),
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_attempts: 3,
        }
    }
}
