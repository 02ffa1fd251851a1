//! Wiring of configured backends into a session manager.

use recall_agent::{
    CheckpointStore, CheckpointWriter, Collaborators, LlmOracles, MemoryCheckpointStore,
    Orchestrator, OrchestratorConfig, SessionManager, SqliteCheckpointStore,
};
use recall_core::{AppConfig, AppResult, RetryPolicy};
use recall_knowledge::{create_provider, SqliteBackend};
use recall_llm::{create_client, ClientSettings, LlmClient};
use std::sync::Arc;
use std::time::Duration;

pub fn llm_client(config: &AppConfig) -> AppResult<Arc<dyn LlmClient>> {
    create_client(&ClientSettings::from(&config.llm))
}

pub fn retrieval_backend(config: &AppConfig) -> AppResult<Arc<SqliteBackend>> {
    let embedder = create_provider(
        &config.retrieval,
        config.llm.endpoint.as_deref(),
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    Ok(Arc::new(SqliteBackend::open(config.index_path(), embedder)?))
}

pub fn checkpoint_store(config: &AppConfig) -> AppResult<Arc<dyn CheckpointStore>> {
    let ttl = Duration::from_secs(config.checkpoint.ttl_secs);
    match config.checkpoint.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCheckpointStore::with_ttl(ttl))),
        _ => Ok(Arc::new(SqliteCheckpointStore::open(config.checkpoint_path())?)),
    }
}

/// Build a session manager from configuration.
pub fn session_manager(config: &AppConfig) -> AppResult<SessionManager> {
    let client = llm_client(config)?;
    let oracles = Arc::new(LlmOracles::from_workspace(
        client,
        &config.llm.model,
        &config.workspace,
    )?);

    let writer = CheckpointWriter::new(
        checkpoint_store(config)?,
        RetryPolicy::new(
            config.checkpoint.write_retries,
            Duration::from_millis(config.checkpoint.initial_backoff_ms),
        ),
    );

    let orchestrator = Orchestrator::new(
        OrchestratorConfig::from(config),
        Collaborators::with_oracles(retrieval_backend(config)?, oracles),
        writer,
    );

    Ok(SessionManager::new(
        Arc::new(orchestrator),
        Duration::from_secs(config.checkpoint.ttl_secs),
    ))
}
