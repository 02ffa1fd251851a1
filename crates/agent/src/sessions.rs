//! Session lifecycle: ask, resume, cancel, close, purge.
//!
//! Work on one session is serialized through a per-session async mutex;
//! different sessions run concurrently and share only the orchestrator's
//! collaborators and the checkpoint store.

use crate::checkpoint::{CheckpointStore, CheckpointSummary};
use crate::orchestrator::Orchestrator;
use crate::types::{Session, TurnOutcome};
use recall_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct SessionManager {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn CheckpointStore>,
    ttl: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl SessionManager {
    /// Sessions are persisted through the orchestrator's checkpoint store.
    pub fn new(orchestrator: Arc<Orchestrator>, ttl: Duration) -> Self {
        let store = orchestrator.writer().store().clone();
        Self {
            orchestrator,
            store,
            ttl,
            locks: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Answer `query` as a new turn of `session_id`, or of a fresh session.
    ///
    /// Fails with [`AppError::Orchestration`] if the session's latest turn
    /// never finished; resume or close it first.
    pub async fn ask(&self, session_id: Option<&str>, query: &str) -> AppResult<TurnOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Orchestration("Query must not be empty".to_string()));
        }

        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(Self::new_session_id);

        let lock = self.lock_for(&id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.ask_locked(&id, query).await
        };
        self.release_lock(&id, lock).await;
        outcome
    }

    async fn ask_locked(&self, id: &str, query: &str) -> AppResult<TurnOutcome> {
        let mut session = match self.store.load(id).await? {
            Some(snapshot) => snapshot.session,
            None => {
                tracing::info!(session = %id, "Starting new session");
                Session::new(id)
            }
        };

        if !session.is_idle() {
            return Err(AppError::Orchestration(format!(
                "Session {} has an unfinished turn; resume or close it first",
                id
            )));
        }

        session.begin_turn(query, self.orchestrator.config().top_k);
        self.run(&mut session).await
    }

    /// Continue the unfinished turn of `session_id` from its last checkpoint.
    pub async fn resume(&self, session_id: &str) -> AppResult<TurnOutcome> {
        let lock = self.lock_for(session_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.resume_locked(session_id).await
        };
        self.release_lock(session_id, lock).await;
        outcome
    }

    async fn resume_locked(&self, session_id: &str) -> AppResult<TurnOutcome> {
        let mut session = self
            .store
            .load(session_id)
            .await?
            .map(|snapshot| snapshot.session)
            .ok_or_else(|| AppError::Checkpoint(format!("No checkpoint for session {}", session_id)))?;

        if session.is_idle() {
            return Err(AppError::Orchestration(format!(
                "Session {} has no unfinished turn to resume",
                session_id
            )));
        }

        tracing::info!(
            session = session_id,
            state = ?session.state(),
            "Resuming turn from checkpoint"
        );
        self.run(&mut session).await
    }

    /// Cancel the running turn of `session_id`. Returns false if none is running.
    pub async fn cancel(&self, session_id: &str) -> bool {
        match self.running.lock().await.get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel any running turn and delete the session's checkpoint.
    pub async fn close(&self, session_id: &str) -> AppResult<bool> {
        self.cancel(session_id).await;

        let lock = self.lock_for(session_id).await;
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete(session_id).await
        };
        self.release_lock(session_id, lock).await;

        let existed = deleted?;
        tracing::info!(session = session_id, existed, "Closed session");
        Ok(existed)
    }

    /// Delete checkpoints older than the session TTL.
    pub async fn purge_expired(&self) -> AppResult<usize> {
        self.store.purge_older_than(self.ttl).await
    }

    /// The last committed state of `session_id`.
    pub async fn show(&self, session_id: &str) -> AppResult<Option<Session>> {
        Ok(self.store.load(session_id).await?.map(|s| s.session))
    }

    pub async fn list(&self) -> AppResult<Vec<CheckpointSummary>> {
        self.store.list().await
    }

    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Give back a lock taken with `lock_for`, dropping the map entry once
    /// no other caller holds or waits on it.
    ///
    /// Clones are only handed out under the map lock, so a count of two (the
    /// map's and ours) means nobody else can reach this mutex.
    async fn release_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        let unshared = locks
            .get(session_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if unshared {
            locks.remove(session_id);
        }
    }

    async fn run(&self, session: &mut Session) -> AppResult<TurnOutcome> {
        let token = CancellationToken::new();
        self.running
            .lock()
            .await
            .insert(session.id.clone(), token.clone());

        let outcome = self.orchestrator.run_turn(session, &token).await;

        self.running.lock().await.remove(&session.id);
        outcome
    }
}
