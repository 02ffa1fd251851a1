//! Deadlines and cancellation for calls into external collaborators.

use recall_core::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run `call` under a deadline, aborting early if `cancel` fires.
///
/// A missed deadline becomes [`AppError::Timeout`] naming `operation`;
/// cancellation becomes [`AppError::Cancelled`] and drops the in-flight call.
pub async fn guarded<T, F>(
    operation: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    call: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(inner) => inner,
            Err(_) => {
                tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "Call timed out");
                Err(AppError::Timeout {
                    operation: operation.to_string(),
                    after: timeout,
                })
            }
        },
    }
}
