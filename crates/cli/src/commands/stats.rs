//! Stats command handler.

use crate::runtime;
use clap::Args;
use recall_core::{AppConfig, AppResult};
use recall_prompt::list_prompts;

/// Show index, prompt and backend status
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Also check that the LLM backend is reachable
    #[arg(long)]
    pub check: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let index = runtime::retrieval_backend(config)?.stats().await?;
        let prompts = list_prompts(&config.workspace)?;
        let sessions = runtime::checkpoint_store(config)?.list().await?.len();

        let llm_status = if self.check {
            let client = runtime::llm_client(config)?;
            Some(match client.health_check().await {
                Ok(()) => "reachable".to_string(),
                Err(e) => format!("unreachable ({})", e),
            })
        } else {
            None
        };

        if self.json {
            let output = serde_json::json!({
                "index": index,
                "prompts": prompts
                    .iter()
                    .map(|(id, origin)| serde_json::json!({ "id": id, "origin": origin }))
                    .collect::<Vec<_>>(),
                "sessions": sessions,
                "llm": {
                    "provider": config.llm.provider,
                    "model": config.llm.model,
                    "status": llm_status,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!("Index: {:?}", config.index_path());
        println!("  documents: {}", index.documents);
        if let Some(dims) = index.embedding_dimensions {
            println!("  embedding dimensions: {}", dims);
        }
        println!("  size: {} bytes", index.db_size_bytes);
        if let Some(at) = index.last_indexed_at {
            println!("  last indexed: {}", at.format("%Y-%m-%d %H:%M:%S"));
        }

        println!("Prompts:");
        for (id, origin) in &prompts {
            println!("  {} ({:?})", id, origin);
        }

        println!("Sessions: {}", sessions);
        println!("LLM: {} / {}", config.llm.provider, config.llm.model);
        if let Some(status) = llm_status {
            println!("  {}", status);
        }

        Ok(())
    }
}
