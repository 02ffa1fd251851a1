use super::{cutoff_for, CheckpointStore, CheckpointSummary, SessionSnapshot};
use crate::types::State;
use chrono::{DateTime, SecondsFormat, Utc};
use recall_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store backed by a SQLite file, one row per session.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    db_path: PathBuf,
}

impl SqliteCheckpointStore {
    /// Open the store at `db_path`, creating the file and schema if needed.
    pub fn open(db_path: impl Into<PathBuf>) -> AppResult<Self> {
        let db_path = db_path.into();
        open_connection(&db_path)?;
        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Checkpoint(format!("Checkpoint task failed: {}", e)))?
    }
}

fn open_connection(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::Checkpoint(format!("Failed to create checkpoint directory: {}", e))
        })?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Checkpoint(format!("Failed to open checkpoint database: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            session_id TEXT PRIMARY KEY,
            state TEXT,
            turns INTEGER NOT NULL,
            snapshot TEXT NOT NULL,
            saved_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_checkpoints_saved_at ON checkpoints(saved_at);
        "#,
    )
    .map_err(|e| AppError::Checkpoint(format!("Failed to create tables: {}", e)))?;

    Ok(conn)
}

/// Fixed-width UTC timestamps so that text order matches time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_state(value: Option<String>) -> Option<State> {
    value.and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok())
}

#[async_trait::async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> AppResult<()> {
        let json = snapshot.to_json()?;
        let session_id = snapshot.session_id().to_string();
        let state = snapshot.session.state().map(|s| s.as_str().to_string());
        let turns = snapshot.session.turns.len() as i64;
        let saved_at = timestamp(&snapshot.saved_at);

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (session_id, state, turns, snapshot, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, state, turns, json, saved_at],
            )
            .map_err(|e| AppError::Checkpoint(format!("Failed to save checkpoint: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn load(&self, session_id: &str) -> AppResult<Option<SessionSnapshot>> {
        let session_id = session_id.to_string();
        let json: Option<String> = self
            .with_connection(move |conn| {
                conn.query_row(
                    "SELECT snapshot FROM checkpoints WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| AppError::Checkpoint(format!("Failed to load checkpoint: {}", e)))
            })
            .await?;

        json.as_deref().map(SessionSnapshot::from_json).transpose()
    }

    async fn delete(&self, session_id: &str) -> AppResult<bool> {
        let session_id = session_id.to_string();
        self.with_connection(move |conn| {
            let removed = conn
                .execute("DELETE FROM checkpoints WHERE session_id = ?1", params![session_id])
                .map_err(|e| AppError::Checkpoint(format!("Failed to delete checkpoint: {}", e)))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list(&self) -> AppResult<Vec<CheckpointSummary>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, state, turns, saved_at FROM checkpoints
                     ORDER BY saved_at DESC, session_id",
                )
                .map_err(|e| AppError::Checkpoint(format!("Failed to prepare query: {}", e)))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| AppError::Checkpoint(format!("Failed to list checkpoints: {}", e)))?;

            let mut summaries = Vec::new();
            for row in rows {
                let (session_id, state, turns, saved_at) = row
                    .map_err(|e| AppError::Checkpoint(format!("Failed to read checkpoint row: {}", e)))?;
                let saved_at = DateTime::parse_from_rfc3339(&saved_at)
                    .map_err(|e| AppError::Checkpoint(format!("Invalid checkpoint timestamp: {}", e)))?
                    .with_timezone(&Utc);

                summaries.push(CheckpointSummary {
                    session_id,
                    state: parse_state(state),
                    turns: turns.max(0) as usize,
                    saved_at,
                });
            }
            Ok(summaries)
        })
        .await
    }

    async fn purge_older_than(&self, age: Duration) -> AppResult<usize> {
        let cutoff = timestamp(&cutoff_for(age));
        let removed = self
            .with_connection(move |conn| {
                conn.execute("DELETE FROM checkpoints WHERE saved_at < ?1", params![cutoff])
                    .map_err(|e| AppError::Checkpoint(format!("Failed to purge checkpoints: {}", e)))
            })
            .await?;

        if removed > 0 {
            tracing::info!(removed, "Purged expired checkpoints");
        }
        Ok(removed)
    }
}
