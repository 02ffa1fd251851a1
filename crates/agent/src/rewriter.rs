//! Query rewriting with a no-repeat guarantee.

use crate::guard::guarded;
use crate::oracles::{RewriteOracle, RewriteRequest};
use crate::types::normalize_query;
use recall_core::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct QueryRewriter {
    oracle: Arc<dyn RewriteOracle>,
    timeout: Duration,
    max_attempts: u32,
}

impl QueryRewriter {
    pub fn new(oracle: Arc<dyn RewriteOracle>, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            oracle,
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Produce a query that differs, after normalization, from the original,
    /// the current query and every query in `request.history`.
    ///
    /// A repeated, empty or failed proposal is retried with `diversify` set.
    /// After `max_attempts` proposals, fails with [`AppError::RewriteExhausted`].
    pub async fn rewrite(
        &self,
        mut request: RewriteRequest,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        let mut seen: HashSet<String> = request
            .history
            .iter()
            .chain([&request.original, &request.current])
            .map(|q| normalize_query(q))
            .collect();

        for attempt in 1..=self.max_attempts {
            let proposal = guarded(
                "query rewrite",
                self.timeout,
                cancel,
                self.oracle.rewrite(&request),
            )
            .await;

            match proposal {
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Rewrite oracle failed");
                }
                Ok(text) => {
                    let text = text.trim();
                    let normalized = normalize_query(text);
                    if normalized.is_empty() {
                        tracing::debug!(attempt, "Rewrite oracle returned an empty query");
                    } else if seen.contains(&normalized) {
                        tracing::debug!(attempt, proposal = text, "Rewrite repeated an earlier query");
                        seen.insert(normalized);
                    } else {
                        tracing::info!(attempt, rewritten = text, "Rewrote query");
                        return Ok(text.to_string());
                    }
                }
            }

            request.diversify = true;
        }

        Err(AppError::RewriteExhausted {
            attempts: self.max_attempts,
        })
    }
}
