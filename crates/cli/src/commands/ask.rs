//! Ask command handler.

use super::print_outcome;
use crate::runtime;
use clap::Args;
use recall_agent::SessionManager;
use recall_core::{AppConfig, AppError, AppResult};

/// Ask a question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Continue an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Documents per retrieval
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Weight of dense scores in fusion (0.0-1.0)
    #[arg(long)]
    pub weight: Option<f32>,

    /// Output the turn report as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, mut config: AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let query = self.query.join(" ");
        if query.trim().is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }

        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(weight) = self.weight {
            config.retrieval.dense_weight = weight;
        }
        config.validate()?;

        let manager = runtime::session_manager(&config)?;
        let session_id = self
            .session
            .clone()
            .unwrap_or_else(SessionManager::new_session_id);

        let ask = manager.ask(Some(&session_id), &query);
        tokio::pin!(ask);

        let outcome = tokio::select! {
            outcome = &mut ask => outcome?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(session = %session_id, "Interrupted, cancelling turn");
                manager.cancel(&session_id).await;
                ask.await?
            }
        };

        print_outcome(&outcome, self.json)
    }
}
