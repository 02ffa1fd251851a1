//! Exponential backoff for calls that may fail transiently.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }

    /// Unjittered schedule; the attempt count, not elapsed time, ends it.
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_backoff)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// Errors for which `is_retryable` returns false are returned immediately.
/// After the last attempt the final error is returned unchanged.
pub async fn with_retry<F, Fut, T, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    P: Fn(&AppError) -> bool,
{
    let max_attempts = policy.max_attempts;
    let is_retryable = &is_retryable;
    let operation = &mut operation;
    let mut attempt = 0u32;

    backoff::future::retry_notify(
        policy.to_backoff(),
        move || {
            attempt += 1;
            let last = attempt >= max_attempts;
            let call = operation();
            async move {
                call.await.map_err(|e| {
                    if last || !is_retryable(&e) {
                        backoff::Error::permanent(e)
                    } else {
                        backoff::Error::transient(e)
                    }
                })
            }
        },
        |e: AppError, wait: Duration| {
            tracing::warn!(
                max = max_attempts,
                backoff_ms = wait.as_millis() as u64,
                error = %e,
                "Retrying after transient error"
            );
        },
    )
    .await
}
