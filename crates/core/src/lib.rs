//! Recall Core Library
//!
//! This crate provides the foundational utilities shared by every Recall crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Layered configuration (defaults, YAML, environment, CLI flags)
//! - Exponential-backoff retries for transient failures

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use config::{AppConfig, ConfigOverrides};
pub use error::{AppError, AppResult};
pub use retry::{with_retry, RetryPolicy};
