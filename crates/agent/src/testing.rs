//! Deterministic doubles for every collaborator of the answering loop.

use crate::checkpoint::{CheckpointStore, CheckpointSummary, MemoryCheckpointStore, SessionSnapshot};
use crate::oracles::{
    EntailmentOracle, InferenceBackend, JudgmentOracle, PromptSections, RewriteOracle,
    RewriteRequest,
};
use crate::types::{GroundVerdict, RankedDocument, Relevance};
use recall_core::{AppError, AppResult};
use recall_knowledge::{RetrievalBackend, SearchHit, SearchMode};
use recall_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn hit(id: &str, score: f32, content: &str) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        score,
        content: content.to_string(),
        source: format!("{}.md", id),
    }
}

pub fn scored(id: &str, content: &str, fused_score: f32) -> RankedDocument {
    RankedDocument {
        id: id.to_string(),
        content: content.to_string(),
        source: format!("{}.md", id),
        dense_score: Some(fused_score),
        sparse_score: None,
        dense_rank: Some(0),
        fused_score,
        relevance: Relevance::Unset,
    }
}

pub fn ranked(id: &str, content: &str) -> RankedDocument {
    scored(id, content, 0.5)
}

#[derive(Clone)]
enum Script {
    Hits(Vec<SearchHit>),
    Fail(String),
    Hang,
}

/// Backend answering every query with a fixed script per mode.
///
/// Modes without a script return an empty list.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: HashMap<SearchMode, Script>,
    calls: Mutex<Vec<(String, usize, SearchMode)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mode: SearchMode, hits: Vec<SearchHit>) -> Self {
        self.scripts.insert(mode, Script::Hits(hits));
        self
    }

    pub fn fail(mut self, mode: SearchMode, message: &str) -> Self {
        self.scripts.insert(mode, Script::Fail(message.to_string()));
        self
    }

    pub fn hang(mut self, mode: SearchMode) -> Self {
        self.scripts.insert(mode, Script::Hang);
        self
    }

    /// Every search as (query, top_k, mode), in call order.
    pub fn calls(&self) -> Vec<(String, usize, SearchMode)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RetrievalBackend for ScriptedBackend {
    async fn search(&self, query: &str, top_k: usize, mode: SearchMode) -> AppResult<Vec<SearchHit>> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), top_k, mode));

        match self.scripts.get(&mode).cloned() {
            None => Ok(Vec::new()),
            Some(Script::Hits(mut hits)) => {
                hits.truncate(top_k);
                Ok(hits)
            }
            Some(Script::Fail(message)) => Err(AppError::Retrieval(message)),
            Some(Script::Hang) => std::future::pending().await,
        }
    }
}

/// Judge deciding relevance by substring of the document content.
pub struct ScriptedJudge {
    marker: String,
    failing: Option<String>,
    hanging: Option<String>,
}

impl ScriptedJudge {
    pub fn relevant_if_contains(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
            failing: None,
            hanging: None,
        }
    }

    /// Judges nothing relevant.
    pub fn never() -> Self {
        Self::relevant_if_contains("\u{0}never\u{0}")
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failing = Some(marker.to_string());
        self
    }

    pub fn hanging_on(mut self, marker: &str) -> Self {
        self.hanging = Some(marker.to_string());
        self
    }
}

#[async_trait::async_trait]
impl JudgmentOracle for ScriptedJudge {
    async fn judge(&self, _query: &str, document: &RankedDocument) -> AppResult<bool> {
        if let Some(marker) = &self.failing {
            if document.content.contains(marker.as_str()) {
                return Err(AppError::Llm("judge unavailable".to_string()));
            }
        }
        if let Some(marker) = &self.hanging {
            if document.content.contains(marker.as_str()) {
                return std::future::pending().await;
            }
        }
        Ok(document.content.contains(self.marker.as_str()))
    }
}

enum Fallback {
    Fail,
    Repeat(String),
    Numbered,
}

/// Rewriter replaying queued replies, then a fallback.
pub struct ScriptedRewriter {
    replies: Mutex<VecDeque<String>>,
    fallback: Fallback,
    requests: Mutex<Vec<RewriteRequest>>,
}

impl ScriptedRewriter {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: Fallback::Fail,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always proposes `query`.
    pub fn repeating(query: &str) -> Self {
        Self {
            fallback: Fallback::Repeat(query.to_string()),
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Proposes "rewritten query 1", "rewritten query 2", ...
    pub fn numbered() -> Self {
        Self {
            fallback: Fallback::Numbered,
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Fails once the queued replies run out.
    pub fn then_fail(mut self) -> Self {
        self.fallback = Fallback::Fail;
        self
    }

    pub fn requests(&self) -> Vec<RewriteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RewriteOracle for ScriptedRewriter {
    async fn rewrite(&self, request: &RewriteRequest) -> AppResult<String> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return Ok(reply);
        }
        match &self.fallback {
            Fallback::Fail => Err(AppError::Llm("rewrite unavailable".to_string())),
            Fallback::Repeat(query) => Ok(query.clone()),
            Fallback::Numbered => Ok(format!("rewritten query {}", call)),
        }
    }
}

/// Inference backend replaying queued outputs; `None` entries fail.
#[derive(Clone, Default)]
pub struct ScriptedInference {
    outputs: Arc<Mutex<VecDeque<Option<String>>>>,
    repeat: Option<String>,
    calls: Arc<Mutex<Vec<PromptSections>>>,
}

impl ScriptedInference {
    /// Replays `outputs`, then fails.
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: Arc::new(Mutex::new(outputs.into_iter().map(|o| Some(o.into())).collect())),
            ..Default::default()
        }
    }

    pub fn always(output: &str) -> Self {
        Self {
            repeat: Some(output.to_string()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PromptSections> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InferenceBackend for ScriptedInference {
    async fn generate(&self, sections: &PromptSections, _budget: usize) -> AppResult<String> {
        self.calls.lock().unwrap().push(sections.clone());

        let next = self.outputs.lock().unwrap().pop_front();
        match next.or_else(|| self.repeat.clone().map(Some)) {
            Some(Some(text)) => Ok(text),
            _ => Err(AppError::Llm("inference backend unavailable".to_string())),
        }
    }
}

enum VerifierMode {
    Queue,
    Fail,
    Hang,
}

/// Verifier replaying verdicts; the last one repeats once the queue is drained.
pub struct ScriptedVerifier {
    verdicts: Mutex<VecDeque<GroundVerdict>>,
    last: Mutex<Option<GroundVerdict>>,
    mode: VerifierMode,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn new<I: IntoIterator<Item = GroundVerdict>>(verdicts: I) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into_iter().collect()),
            last: Mutex::new(None),
            mode: VerifierMode::Queue,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: VerifierMode::Fail,
            ..Self::new([])
        }
    }

    pub fn hanging() -> Self {
        Self {
            mode: VerifierMode::Hang,
            ..Self::new([])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EntailmentOracle for ScriptedVerifier {
    async fn verify(&self, _answer: &str, _evidence: &[RankedDocument]) -> AppResult<GroundVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            VerifierMode::Fail => Err(AppError::Llm("verifier unavailable".to_string())),
            VerifierMode::Hang => std::future::pending().await,
            VerifierMode::Queue => {
                let mut last = self.last.lock().unwrap();
                if let Some(verdict) = self.verdicts.lock().unwrap().pop_front() {
                    *last = Some(verdict);
                }
                Ok(last.unwrap_or(GroundVerdict::Grounded))
            }
        }
    }
}

/// Memory store whose first `failures` saves fail.
pub struct FlakyStore {
    inner: MemoryCheckpointStore,
    failures: usize,
    hang: bool,
    attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            inner: MemoryCheckpointStore::new(),
            failures,
            hang: false,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Every save stalls forever; reads still work.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::failing_first(0)
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryCheckpointStore {
        &self.inner
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FlakyStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> AppResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if attempt < self.failures {
            return Err(AppError::Checkpoint("disk full".to_string()));
        }
        self.inner.save(snapshot).await
    }

    async fn load(&self, session_id: &str) -> AppResult<Option<SessionSnapshot>> {
        self.inner.load(session_id).await
    }

    async fn delete(&self, session_id: &str) -> AppResult<bool> {
        self.inner.delete(session_id).await
    }

    async fn list(&self) -> AppResult<Vec<CheckpointSummary>> {
        self.inner.list().await
    }

    async fn purge_older_than(&self, age: Duration) -> AppResult<usize> {
        self.inner.purge_older_than(age).await
    }
}

/// LLM client replaying queued replies; fails when the queue is empty.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::Transport("connection refused".to_string()))?;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 2),
            done: true,
        })
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}
