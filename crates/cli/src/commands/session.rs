//! Session command handlers.

use super::print_outcome;
use crate::runtime;
use clap::Subcommand;
use recall_agent::{Session, SessionManager};
use recall_core::{AppConfig, AppError, AppResult};

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Show a session's turns
    Show {
        session_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Continue a session's unfinished turn
    Resume {
        session_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete a session
    Close { session_id: String },

    /// List stored sessions
    List {
        #[arg(long)]
        json: bool,
    },

    /// Delete sessions older than the configured TTL
    Purge,
}

impl SessionCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing session command");
        tracing::debug!("Session command: {:?}", self);

        let manager = runtime::session_manager(config)?;

        match self {
            Self::Show { session_id, json } => {
                let session = manager
                    .show(session_id)
                    .await?
                    .ok_or_else(|| AppError::Checkpoint(format!("No session {}", session_id)))?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&session)?);
                } else {
                    print_session(&session);
                }
            }
            Self::Resume { session_id, json } => {
                let outcome = resume(&manager, session_id).await?;
                print_outcome(&outcome, *json)?;
            }
            Self::Close { session_id } => {
                if manager.close(session_id).await? {
                    println!("Closed session {}", session_id);
                } else {
                    println!("No session {}", session_id);
                }
            }
            Self::List { json } => {
                let sessions = manager.list().await?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&sessions)?);
                } else if sessions.is_empty() {
                    println!("No sessions");
                } else {
                    for summary in sessions {
                        println!(
                            "{}  {:>3} turn(s)  {:<8}  {}",
                            summary.session_id,
                            summary.turns,
                            summary.state.map(|s| s.as_str()).unwrap_or("-"),
                            summary.saved_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }
            Self::Purge => {
                let removed = manager.purge_expired().await?;
                println!("Removed {} expired session(s)", removed);
            }
        }

        Ok(())
    }
}

async fn resume(manager: &SessionManager, session_id: &str) -> AppResult<recall_agent::TurnOutcome> {
    let resume = manager.resume(session_id);
    tokio::pin!(resume);

    tokio::select! {
        outcome = &mut resume => outcome,
        _ = tokio::signal::ctrl_c() => {
            manager.cancel(session_id).await;
            resume.await
        }
    }
}

fn print_session(session: &Session) {
    println!("Session {}", session.id);
    if session.durability_degraded {
        println!("(some checkpoints could not be written)");
    }

    for turn in &session.turns {
        println!();
        println!("#{} {}", turn.index + 1, turn.original_query);
        println!(
            "   state: {}  retrievals: {}  generations: {}",
            turn.state, turn.counters.retrievals, turn.counters.generations
        );
        for rejected in &turn.rewrites {
            println!("   rejected query: {}", rejected.query);
        }
        if let Some(answer) = &turn.final_answer {
            println!("   answer: {}", answer.text);
            if let Some(caveat) = &answer.caveat {
                println!("   {}", caveat);
            }
        }
    }
}
