//! Error types for Recall.
//!
//! A single error enum covers configuration, I/O, backend and persistence
//! failures, plus the recoverable conditions the answering loop resolves on
//! its own (unavailable retrieval, exhausted rewrites, failed generation,
//! failed checkpoint writes).

use std::time::Duration;
use thiserror::Error;

/// Unified error type for Recall.
///
/// All fallible functions return `Result<T, AppError>`.
/// Library code never panics; failures are returned to the caller.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// A remote backend was unreachable or answered with a server error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Retrieval backend and index errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Checkpoint store errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Session and orchestration misuse (e.g. asking on an unfinished turn)
    #[error("Orchestration error: {0}")]
    Orchestration(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Both dense and sparse retrieval failed
    #[error("Retrieval unavailable: dense: {dense}; sparse: {sparse}")]
    RetrievalUnavailable { dense: String, sparse: String },

    /// No novel query reformulation could be produced
    #[error("Rewrite exhausted after {attempts} attempts")]
    RewriteExhausted { attempts: u32 },

    /// Inference backend error or empty output
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Checkpoint write kept failing after retries
    #[error("Checkpoint write failed after {attempts} attempts: {reason}")]
    CheckpointWriteFailed { attempts: u32, reason: String },

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    /// The session was cancelled by its owner
    #[error("Session cancelled")]
    Cancelled,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error came from a deadline rather than the backend itself.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout { .. })
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Timeout { .. } | AppError::Transport(_))
    }

    /// Whether this error is a cancellation of the owning session.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = AppError::Timeout {
            operation: "judge".to_string(),
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "judge timed out after 1500ms");
        assert!(err.is_timeout());
        assert!(err.is_transient());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_retrieval_unavailable_display() {
        let err = AppError::RetrievalUnavailable {
            dense: "index locked".to_string(),
            sparse: "timeout".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("index locked"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_permanent_errors_are_not_transient() {
        assert!(AppError::Transport("503".to_string()).is_transient());
        assert!(!AppError::Llm("bad request".to_string()).is_transient());
        assert!(!AppError::Cancelled.is_transient());
    }

    #[test]
    fn test_from_serde_json() {
        let err: AppError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
