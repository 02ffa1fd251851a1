use super::{cutoff_for, CheckpointStore, CheckpointSummary, SessionSnapshot};
use recall_core::AppResult;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-process store. Snapshots are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    snapshots: RwLock<HashMap<String, SessionSnapshot>>,
    ttl: Option<Duration>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots older than `ttl` are treated as absent on load.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            snapshots: RwLock::default(),
            ttl: Some(ttl),
        }
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> AppResult<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.session_id().to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> AppResult<Option<SessionSnapshot>> {
        let snapshots = self.snapshots.read().await;
        let Some(snapshot) = snapshots.get(session_id) else {
            return Ok(None);
        };

        if let Some(ttl) = self.ttl {
            if snapshot.saved_at < cutoff_for(ttl) {
                tracing::debug!(session = session_id, "Ignoring expired snapshot");
                return Ok(None);
            }
        }

        Ok(Some(snapshot.clone()))
    }

    async fn delete(&self, session_id: &str) -> AppResult<bool> {
        Ok(self.snapshots.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> AppResult<Vec<CheckpointSummary>> {
        let mut summaries: Vec<CheckpointSummary> = self
            .snapshots
            .read()
            .await
            .values()
            .map(SessionSnapshot::summary)
            .collect();
        summaries.sort_by(|a, b| {
            b.saved_at
                .cmp(&a.saved_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(summaries)
    }

    async fn purge_older_than(&self, age: Duration) -> AppResult<usize> {
        let cutoff = cutoff_for(age);
        let mut snapshots = self.snapshots.write().await;
        let before = snapshots.len();
        snapshots.retain(|_, s| s.saved_at >= cutoff);
        Ok(before - snapshots.len())
    }
}
