//! Command handlers for the Recall CLI.

pub mod ask;
pub mod session;
pub mod stats;

pub use ask::AskCommand;
pub use session::SessionCommand;
pub use stats::StatsCommand;

use recall_agent::{TurnOutcome, TurnReport};
use recall_core::AppResult;

/// Print a turn outcome: the answer on stdout, bookkeeping on stderr.
pub(crate) fn print_outcome(outcome: &TurnOutcome, json: bool) -> AppResult<()> {
    match outcome {
        TurnOutcome::Completed(report) if json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        TurnOutcome::Completed(report) => print_report(report),
        TurnOutcome::Cancelled { session_id } if json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "sessionId": session_id,
                    "cancelled": true,
                }))?
            );
        }
        TurnOutcome::Cancelled { session_id } => {
            eprintln!("Cancelled. Resume with: recall session resume {}", session_id);
        }
    }
    Ok(())
}

fn print_report(report: &TurnReport) {
    println!("{}", report.answer.text);

    if let Some(caveat) = &report.answer.caveat {
        println!();
        println!("{}", caveat);
    }

    if !report.answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for citation in &report.answer.citations {
            println!("  [{}] {}", citation.index, citation.source);
        }
    }

    if report.durability_degraded {
        eprintln!("Warning: this session could not be saved reliably.");
    }
    eprintln!("Session: {}", report.session_id);
}
