//! Configuration management for Recall.
//!
//! Configuration is layered, later layers winning:
//! - Built-in defaults
//! - Config file (`.recall/config.yaml`, or the path in `RECALL_CONFIG`)
//! - Environment variables (`RECALL_*`)
//! - Command-line flags
//!
//! The configuration is workspace-centric, with all state stored in `.recall/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the LLM factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 1] = ["ollama"];

/// Embedding providers the retrieval backend knows how to build.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["trigram", "ollama"];

/// Checkpoint store backends.
pub const KNOWN_CHECKPOINT_BACKENDS: [&str; 2] = ["sqlite", "memory"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .recall/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub orchestrator: OrchestratorSettings,
    pub checkpoint: CheckpointSettings,
}

/// Inference provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// Provider name (e.g., "ollama")
    pub provider: String,

    /// Model identifier used for every oracle call
    pub model: String,

    /// Custom endpoint URL
    pub endpoint: Option<String>,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,

    /// API key, only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(), // Local-first default
            model: "llama3".to_string(),
            endpoint: None,
            timeout_secs: 120,
            api_key: None,
        }
    }
}

/// Retrieval and ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    /// SQLite index path; defaults to `.recall/index/documents.sqlite`
    pub index_path: Option<PathBuf>,

    /// Documents returned per retrieval call
    pub top_k: u32,

    /// Emphasis on dense over sparse scores, in [0, 1]
    pub dense_weight: f32,

    /// Embedding provider used for dense queries
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Embedding vector dimension
    pub embedding_dimensions: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            index_path: None,
            top_k: 5,
            dense_weight: 0.6,
            embedding_provider: "trigram".to_string(),
            embedding_model: "trigram-v1".to_string(),
            embedding_dimensions: 384,
        }
    }
}

/// Bounds and budgets for the answering loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorSettings {
    pub max_retrieval_attempts: u32,
    pub max_generation_attempts: u32,

    /// Internal attempts the rewriter makes before giving up
    pub max_rewrite_attempts: u32,

    /// Relevant documents required for a sufficient grade
    pub min_relevant_documents: u32,

    /// Character budget for the generation prompt
    pub context_budget_chars: usize,

    /// Deadline for every backend and oracle call, in seconds
    pub backend_timeout_secs: u64,

    /// Completed turns handed to the rewriter as conversation context
    pub history_turns: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_retrieval_attempts: 3,
            max_generation_attempts: 2,
            max_rewrite_attempts: 3,
            min_relevant_documents: 1,
            context_budget_chars: 4000,
            backend_timeout_secs: 30,
            history_turns: 5,
        }
    }
}

/// Checkpoint persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckpointSettings {
    /// "sqlite" or "memory"
    pub backend: String,

    /// SQLite path; defaults to `.recall/sessions.sqlite`
    pub path: Option<PathBuf>,

    /// Checkpoints older than this are expired
    pub ttl_secs: u64,

    /// Attempts per checkpoint write before the step proceeds uncommitted
    pub write_retries: u32,

    /// First backoff delay between write attempts, doubled each time
    pub initial_backoff_ms: u64,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: None,
            ttl_secs: 7 * 24 * 60 * 60,
            write_retries: 3,
            initial_backoff_ms: 50,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSettings>,
    retrieval: Option<RetrievalSettings>,
    orchestrator: Option<OrchestratorSettings>,
    checkpoint: Option<CheckpointSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub log_level: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            checkpoint: CheckpointSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and environment variables.
    ///
    /// Environment variables:
    /// - `RECALL_WORKSPACE`: Override workspace path
    /// - `RECALL_CONFIG`: Path to config file
    /// - `RECALL_PROVIDER`, `RECALL_MODEL`, `RECALL_LLM_ENDPOINT`, `RECALL_API_KEY`
    /// - `RECALL_TOP_K`, `RECALL_DENSE_WEIGHT`
    /// - `RECALL_CHECKPOINT_BACKEND`
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use recall_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using a custom environment lookup.
    pub fn load_with<F>(env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(workspace) = env("RECALL_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Some(config_file) = env("RECALL_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.recall_dir().join("config.yaml"));

        if config_path.exists() {
            config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        config.apply_env(&env)?;

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &Path) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        if let Some(llm) = file.llm {
            self.llm = llm;
        }
        if let Some(retrieval) = file.retrieval {
            self.retrieval = retrieval;
        }
        if let Some(orchestrator) = file.orchestrator {
            self.orchestrator = orchestrator;
        }
        if let Some(checkpoint) = file.checkpoint {
            self.checkpoint = checkpoint;
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(json) = logging.json {
                self.log_json = json;
            }
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(())
    }

    fn apply_env<F>(&mut self, env: &F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = env("RECALL_PROVIDER") {
            self.llm.provider = provider;
        }

        if let Some(model) = env("RECALL_MODEL") {
            self.llm.model = model;
        }

        if let Some(endpoint) = env("RECALL_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        self.llm.api_key = env("RECALL_API_KEY");

        if let Some(top_k) = env("RECALL_TOP_K") {
            self.retrieval.top_k = top_k
                .parse()
                .map_err(|_| AppError::Config(format!("Invalid RECALL_TOP_K: {}", top_k)))?;
        }

        if let Some(weight) = env("RECALL_DENSE_WEIGHT") {
            self.retrieval.dense_weight = weight.parse().map_err(|_| {
                AppError::Config(format!("Invalid RECALL_DENSE_WEIGHT: {}", weight))
            })?;
        }

        if let Some(backend) = env("RECALL_CHECKPOINT_BACKEND") {
            self.checkpoint.backend = backend;
        }

        if let Some(level) = env("RUST_LOG") {
            self.log_level = Some(level);
        }

        if env("NO_COLOR").is_some() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(workspace) = overrides.workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = overrides.config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = overrides.provider {
            self.llm.provider = provider;
        }

        if let Some(model) = overrides.model {
            self.llm.model = model;
        }

        if let Some(log_level) = overrides.log_level {
            self.log_level = Some(log_level);
        }

        if overrides.verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if overrides.no_color {
            self.no_color = true;
        }

        if overrides.log_json {
            self.log_json = true;
        }

        self
    }

    /// Get the path to the .recall directory.
    pub fn recall_dir(&self) -> PathBuf {
        self.workspace.join(".recall")
    }

    /// Ensure the .recall directory exists.
    pub fn ensure_recall_dir(&self) -> AppResult<()> {
        let recall_dir = self.recall_dir();
        if !recall_dir.exists() {
            std::fs::create_dir_all(&recall_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .recall directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved path of the document index.
    pub fn index_path(&self) -> PathBuf {
        self.retrieval
            .index_path
            .clone()
            .unwrap_or_else(|| self.recall_dir().join("index").join("documents.sqlite"))
    }

    /// Resolved path of the SQLite checkpoint store.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint
            .path
            .clone()
            .unwrap_or_else(|| self.recall_dir().join("sessions.sqlite"))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.llm.provider.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.retrieval.embedding_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.retrieval.embedding_provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if !KNOWN_CHECKPOINT_BACKENDS.contains(&self.checkpoint.backend.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown checkpoint backend: {}. Supported: {}",
                self.checkpoint.backend,
                KNOWN_CHECKPOINT_BACKENDS.join(", ")
            )));
        }

        if !(0.0..=1.0).contains(&self.retrieval.dense_weight) {
            return Err(AppError::Config(format!(
                "Dense weight must be within [0, 1], got {}",
                self.retrieval.dense_weight
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(AppError::Config("top_k must be at least 1".to_string()));
        }

        let o = &self.orchestrator;
        if o.max_retrieval_attempts == 0 || o.max_generation_attempts == 0 {
            return Err(AppError::Config(
                "Retrieval and generation attempt bounds must be at least 1".to_string(),
            ));
        }

        if o.max_rewrite_attempts == 0 {
            return Err(AppError::Config(
                "max_rewrite_attempts must be at least 1".to_string(),
            ));
        }

        if o.backend_timeout_secs == 0 {
            return Err(AppError::Config(
                "backend_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
