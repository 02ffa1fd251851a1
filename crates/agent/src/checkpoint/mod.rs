//! Durable session snapshots.
//!
//! A [`CheckpointStore`] keeps the latest acknowledged snapshot per session.
//! Saves are idempotent overwrites, so retrying a save is always safe.

mod memory;
mod sqlite;

pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use crate::guard::guarded;
use crate::types::{Session, State};
use chrono::{DateTime, Utc};
use recall_core::{AppError, AppResult, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Snapshot layout written by this version.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub session: Session,
}

impl SessionSnapshot {
    pub fn new(session: &Session) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            saved_at: Utc::now(),
            session: session.clone(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            session_id: self.session.id.clone(),
            state: self.session.state(),
            turns: self.session.turns.len(),
            saved_at: self.saved_at,
        }
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored snapshot, rejecting layouts this version cannot read.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let version = value
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| AppError::Checkpoint("Snapshot has no format version".to_string()))?;

        if version != u64::from(CURRENT_FORMAT_VERSION) {
            return Err(AppError::Checkpoint(format!(
                "Unsupported snapshot format version {} (expected {})",
                version, CURRENT_FORMAT_VERSION
            )));
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// One row of a store listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub session_id: String,
    /// State of the latest turn; None for a session without turns
    pub state: Option<State>,
    pub turns: usize,
    pub saved_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store `snapshot` as the latest for its session.
    async fn save(&self, snapshot: &SessionSnapshot) -> AppResult<()>;

    /// The most recently saved snapshot, if any.
    async fn load(&self, session_id: &str) -> AppResult<Option<SessionSnapshot>>;

    /// Returns whether a snapshot existed.
    async fn delete(&self, session_id: &str) -> AppResult<bool>;

    /// All stored sessions, most recently saved first.
    async fn list(&self) -> AppResult<Vec<CheckpointSummary>>;

    /// Remove snapshots saved more than `age` ago; returns how many were removed.
    async fn purge_older_than(&self, age: Duration) -> AppResult<usize>;
}

/// Deadline for one save attempt unless the writer is given another.
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Saves sessions with bounded retries, each attempt under a deadline.
#[derive(Clone)]
pub struct CheckpointWriter {
    store: Arc<dyn CheckpointStore>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl CheckpointWriter {
    pub fn new(store: Arc<dyn CheckpointStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            timeout: DEFAULT_SAVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Save `session`, retrying every failure with backoff.
    ///
    /// A stalled attempt counts as a failure once the deadline passes.
    /// Fails with [`AppError::CheckpointWriteFailed`] once the policy is spent,
    /// or with [`AppError::Cancelled`] as soon as `cancel` fires.
    pub async fn commit(&self, session: &Session, cancel: &CancellationToken) -> AppResult<()> {
        let snapshot = SessionSnapshot::new(session);
        let result = recall_core::with_retry(
            &self.policy,
            |e| !e.is_cancelled(),
            || guarded("checkpoint write", self.timeout, cancel, self.store.save(&snapshot)),
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) => Err(AppError::CheckpointWriteFailed {
                attempts: self.policy.max_attempts,
                reason: e.to_string(),
            }),
        }
    }
}

pub(crate) fn cutoff_for(age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyStore;

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let mut snapshot = SessionSnapshot::new(&Session::new("s1"));
        snapshot.format_version = 99;
        let json = snapshot.to_json().unwrap();

        let err = SessionSnapshot::from_json(&json).unwrap_err();
        assert!(matches!(err, AppError::Checkpoint(_)));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_snapshot_round_trips_turn_state() {
        let mut session = Session::new("s1");
        session.begin_turn("What is Error 503?", 5).state = State::Grade;

        let json = SessionSnapshot::new(&session).to_json().unwrap();
        let loaded = SessionSnapshot::from_json(&json).unwrap();
        assert_eq!(loaded.session_id(), "s1");
        assert_eq!(loaded.summary().state, Some(State::Grade));
        assert_eq!(loaded.session.turns[0].original_query, "What is Error 503?");
    }

    #[tokio::test]
    async fn test_writer_retries_then_succeeds() {
        let store = Arc::new(FlakyStore::failing_first(2));
        let writer = CheckpointWriter::new(store.clone(), RetryPolicy::new(3, Duration::from_millis(1)));

        writer
            .commit(&Session::new("s1"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.attempts(), 3);
        assert!(store.inner().load("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_writer_gives_up_after_policy() {
        let store = Arc::new(FlakyStore::failing_first(10));
        let writer = CheckpointWriter::new(store.clone(), RetryPolicy::new(3, Duration::from_millis(1)));

        let err = writer
            .commit(&Session::new("s1"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CheckpointWriteFailed { attempts: 3, .. }));
        assert_eq!(store.attempts(), 3);
    }

    #[tokio::test]
    async fn test_stalled_save_times_out_per_attempt() {
        let store = Arc::new(FlakyStore::hanging());
        let writer = CheckpointWriter::new(store.clone(), RetryPolicy::new(2, Duration::from_millis(1)))
            .with_timeout(Duration::from_millis(20));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            writer.commit(&Session::new("s1"), &CancellationToken::new()),
        )
        .await
        .expect("commit must not stall past its deadlines");

        match result {
            Err(AppError::CheckpointWriteFailed { attempts, reason }) => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("checkpoint write timed out"), "{}", reason);
            }
            other => panic!("expected CheckpointWriteFailed, got {:?}", other),
        }
        assert_eq!(store.attempts(), 2);
    }

    #[tokio::test]
    async fn test_cancel_aborts_stalled_save() {
        let store = Arc::new(FlakyStore::hanging());
        let writer = CheckpointWriter::new(store, RetryPolicy::new(3, Duration::from_millis(1)))
            .with_timeout(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            writer.commit(&Session::new("s1"), &cancel),
        )
        .await
        .expect("cancellation must interrupt the save");
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
