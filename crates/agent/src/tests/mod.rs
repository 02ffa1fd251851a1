//! End-to-end behaviour of the answering loop over scripted collaborators.


use crate::checkpoint::{CheckpointStore, CheckpointWriter, MemoryCheckpointStore};
use crate::orchestrator::{Collaborators, Orchestrator, OrchestratorConfig};
use crate::sessions::SessionManager;
use crate::testing::{ScriptedBackend, ScriptedInference, ScriptedJudge, ScriptedRewriter, ScriptedVerifier};
use crate::types::{normalize_query, TurnOutcome, TurnReport};
use recall_core::RetryPolicy;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub judge: Arc<ScriptedJudge>,
    pub rewriter: Arc<ScriptedRewriter>,
    pub inference: ScriptedInference,
    pub verifier: Arc<ScriptedVerifier>,
    pub store: Arc<dyn CheckpointStore>,
    pub config: OrchestratorConfig,
}

impl Harness {
    pub fn new(
        backend: ScriptedBackend,
        judge: ScriptedJudge,
        rewriter: ScriptedRewriter,
        inference: ScriptedInference,
        verifier: ScriptedVerifier,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            judge: Arc::new(judge),
            rewriter: Arc::new(rewriter),
            inference,
            verifier: Arc::new(verifier),
            store: Arc::new(MemoryCheckpointStore::new()),
            config: OrchestratorConfig {
                backend_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = store;
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut OrchestratorConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn orchestrator(&self) -> Orchestrator {
        let parts = Collaborators {
            backend: self.backend.clone(),
            judge: self.judge.clone(),
            rewriter: self.rewriter.clone(),
            inference: Arc::new(self.inference.clone()),
            entailment: self.verifier.clone(),
        };
        let writer = CheckpointWriter::new(self.store.clone(), RetryPolicy::new(3, Duration::from_millis(1)));
        Orchestrator::new(self.config.clone(), parts, writer)
    }

    pub fn manager(&self) -> SessionManager {
        SessionManager::new(Arc::new(self.orchestrator()), Duration::from_secs(3600))
    }

    /// Ask `query` on a fresh session and expect the turn to complete.
    pub async fn ask(&self, query: &str) -> TurnReport {
        completed(self.manager().ask(None, query).await.unwrap())
    }
}

pub(crate) fn completed(outcome: TurnOutcome) -> TurnReport {
    match outcome {
        TurnOutcome::Completed(report) => report,
        TurnOutcome::Cancelled { session_id } => panic!("turn of {} was cancelled", session_id),
    }
}

pub(crate) fn assert_unique_rewrites(report: &TurnReport) {
    let mut seen = HashSet::new();
    for attempt in &report.rewrites {
        assert!(
            seen.insert(normalize_query(&attempt.query)),
            "query {:?} rejected twice",
            attempt.query
        );
    }
}
