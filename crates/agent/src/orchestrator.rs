//! The answering state machine.
//!
//! [`next_state`] is the whole transition table as a pure function;
//! [`Orchestrator`] executes one state at a time, feeds the step outcome to
//! it and checkpoints the session after every transition.

use crate::checkpoint::CheckpointWriter;
use crate::generator::AnswerGenerator;
use crate::grader::RelevanceGrader;
use crate::oracles::{EntailmentOracle, InferenceBackend, JudgmentOracle, RewriteOracle, RewriteRequest};
use crate::ranker::HybridRanker;
use crate::rewriter::QueryRewriter;
use crate::types::{
    Answer, DegradedReason, GradeVerdict, GroundVerdict, RejectionReason, Session, State, Turn,
    TurnFlags, TurnOutcome, TurnReport, FALLBACK_ANSWER,
};
use crate::verifier::GroundednessVerifier;
use chrono::Utc;
use recall_core::{AppConfig, AppError, AppResult};
use recall_knowledge::RetrievalBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Characters of an irrelevant document shown to the rewriter.
const AVOID_EXCERPT_CHARS: usize = 160;

/// Per-turn iteration bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_retrieval_attempts: u32,
    pub max_generation_attempts: u32,
}

impl Limits {
    pub fn new(max_retrieval_attempts: u32, max_generation_attempts: u32) -> Self {
        Self {
            max_retrieval_attempts: max_retrieval_attempts.max(1),
            max_generation_attempts: max_generation_attempts.max(1),
        }
    }

    /// Hard cap on transitions per turn.
    ///
    /// A safety net only. Every path through the transition table ends well
    /// inside it (about a dozen transitions with the default limits, against a
    /// budget of 16), so no reachable scenario ends in
    /// [`DegradedReason::TransitionBudget`].
    pub fn transition_budget(&self) -> u32 {
        3 * self.max_retrieval_attempts + 2 * self.max_generation_attempts + 3
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// What executing a state produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Retrieved,
    RetrievalUnavailable,
    Graded(GradeVerdict),
    Rewritten,
    RewriteExhausted,
    Generated,
    GenerationFailed,
    Verified(GroundVerdict),
}

/// Evidence to hand the next generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceChoice {
    /// Relevant documents of the latest retrieval
    Accepted,
    /// Best graded set seen in the turn
    BestAvailable,
    /// No evidence at all
    Empty,
    /// Whatever the previous generation used
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Grounded,
    Degraded(DegradedReason),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Retrieve,
    Grade,
    Rewrite,
    Generate {
        evidence: EvidenceChoice,
        degraded: Option<DegradedReason>,
    },
    Verify,
    End(Ending),
}

impl Transition {
    pub fn target(&self) -> State {
        match self {
            Self::Retrieve => State::Retrieve,
            Self::Grade => State::Grade,
            Self::Rewrite => State::Rewrite,
            Self::Generate { .. } => State::Generate,
            Self::Verify => State::Verify,
            Self::End(_) => State::End,
        }
    }
}

/// The transition table.
///
/// `counters` are the turn's counters after executing `state`. Pairing a
/// state with an outcome it cannot produce is an orchestration error.
pub fn next_state(
    state: State,
    outcome: StepOutcome,
    counters: crate::types::Counters,
    limits: Limits,
) -> AppResult<Transition> {
    if counters.transitions >= limits.transition_budget() {
        return Ok(Transition::End(Ending::Degraded(DegradedReason::TransitionBudget)));
    }

    let retrievals_left = counters.retrievals < limits.max_retrieval_attempts;
    let generations_left = counters.generations < limits.max_generation_attempts;

    let transition = match (state, outcome) {
        (State::Retrieve, StepOutcome::Retrieved) => Transition::Grade,
        (State::Retrieve, StepOutcome::RetrievalUnavailable) => Transition::Generate {
            evidence: EvidenceChoice::Empty,
            degraded: Some(DegradedReason::RetrievalUnavailable),
        },

        (State::Grade, StepOutcome::Graded(GradeVerdict::Sufficient)) => Transition::Generate {
            evidence: EvidenceChoice::Accepted,
            degraded: None,
        },
        (State::Grade, StepOutcome::Graded(GradeVerdict::Insufficient)) if retrievals_left => {
            Transition::Rewrite
        }
        (State::Grade, StepOutcome::Graded(GradeVerdict::Insufficient)) => Transition::Generate {
            evidence: EvidenceChoice::BestAvailable,
            degraded: Some(DegradedReason::RetrievalExhausted),
        },

        (State::Rewrite, StepOutcome::Rewritten) => Transition::Retrieve,
        (State::Rewrite, StepOutcome::RewriteExhausted) => Transition::Generate {
            evidence: EvidenceChoice::BestAvailable,
            degraded: Some(DegradedReason::RewriteExhausted),
        },

        (State::Generate, StepOutcome::Generated) => Transition::Verify,
        (State::Generate, StepOutcome::GenerationFailed) if generations_left => {
            Transition::Generate {
                evidence: EvidenceChoice::Keep,
                degraded: None,
            }
        }
        (State::Generate, StepOutcome::GenerationFailed) => Transition::End(Ending::Failed),

        (State::Verify, StepOutcome::Verified(GroundVerdict::Grounded)) => {
            Transition::End(Ending::Grounded)
        }
        (State::Verify, StepOutcome::Verified(GroundVerdict::Unsupported)) if generations_left => {
            Transition::Generate {
                evidence: EvidenceChoice::Keep,
                degraded: None,
            }
        }
        (State::Verify, StepOutcome::Verified(GroundVerdict::Unsupported)) => {
            Transition::End(Ending::Degraded(DegradedReason::UnsupportedAnswer))
        }
        (State::Verify, StepOutcome::Verified(GroundVerdict::NeedsMoreEvidence))
            if retrievals_left && generations_left =>
        {
            Transition::Retrieve
        }
        (State::Verify, StepOutcome::Verified(GroundVerdict::NeedsMoreEvidence)) => {
            Transition::End(Ending::Degraded(DegradedReason::EvidenceExhausted))
        }

        (state, outcome) => {
            return Err(AppError::Orchestration(format!(
                "{:?} cannot follow {}",
                outcome, state
            )))
        }
    };

    Ok(transition)
}

/// Tunables for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub top_k: usize,
    pub dense_weight: f32,
    pub limits: Limits,
    pub max_rewrite_attempts: u32,
    pub min_relevant_documents: usize,
    pub context_budget_chars: usize,
    pub backend_timeout: Duration,
    pub history_turns: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            dense_weight: 0.6,
            limits: Limits::default(),
            max_rewrite_attempts: 3,
            min_relevant_documents: 1,
            context_budget_chars: 4000,
            backend_timeout: Duration::from_secs(30),
            history_turns: 5,
        }
    }
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        let o = &config.orchestrator;
        Self {
            top_k: config.retrieval.top_k as usize,
            dense_weight: config.retrieval.dense_weight,
            limits: Limits::new(o.max_retrieval_attempts, o.max_generation_attempts),
            max_rewrite_attempts: o.max_rewrite_attempts,
            min_relevant_documents: o.min_relevant_documents as usize,
            context_budget_chars: o.context_budget_chars,
            backend_timeout: Duration::from_secs(o.backend_timeout_secs),
            history_turns: o.history_turns,
        }
    }
}

/// The external collaborators of a turn.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn RetrievalBackend>,
    pub judge: Arc<dyn JudgmentOracle>,
    pub rewriter: Arc<dyn RewriteOracle>,
    pub inference: Arc<dyn InferenceBackend>,
    pub entailment: Arc<dyn EntailmentOracle>,
}

impl Collaborators {
    /// Use one value for all four oracles.
    pub fn with_oracles<O>(backend: Arc<dyn RetrievalBackend>, oracles: Arc<O>) -> Self
    where
        O: JudgmentOracle + RewriteOracle + InferenceBackend + EntailmentOracle + 'static,
    {
        Self {
            backend,
            judge: oracles.clone(),
            rewriter: oracles.clone(),
            inference: oracles.clone(),
            entailment: oracles,
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    ranker: HybridRanker,
    grader: RelevanceGrader,
    rewriter: QueryRewriter,
    generator: AnswerGenerator,
    verifier: GroundednessVerifier,
    writer: CheckpointWriter,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, parts: Collaborators, writer: CheckpointWriter) -> Self {
        let timeout = config.backend_timeout;
        Self {
            ranker: HybridRanker::new(parts.backend, timeout),
            grader: RelevanceGrader::new(parts.judge, timeout, config.min_relevant_documents),
            rewriter: QueryRewriter::new(parts.rewriter, timeout, config.max_rewrite_attempts),
            generator: AnswerGenerator::new(parts.inference, timeout, config.context_budget_chars),
            verifier: GroundednessVerifier::new(parts.entailment, timeout),
            writer: writer.with_timeout(timeout),
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn writer(&self) -> &CheckpointWriter {
        &self.writer
    }

    /// Drive the session's latest turn to END, starting from its recorded state.
    ///
    /// Returns [`TurnOutcome::Cancelled`] if `cancel` fires; the session value
    /// may then hold uncommitted progress and should be discarded.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> AppResult<TurnOutcome> {
        let turn_index = session
            .current_turn()
            .map(|t| t.index)
            .ok_or_else(|| AppError::Orchestration("Session has no turn to run".to_string()))?;

        let span = tracing::info_span!("turn", session = %session.id, turn = turn_index);
        self.drive(session, cancel).instrument(span).await
    }

    async fn drive(&self, session: &mut Session, cancel: &CancellationToken) -> AppResult<TurnOutcome> {
        self.commit(session, cancel).await;

        loop {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(session));
            }

            let state = match session.current_turn() {
                Some(turn) if turn.is_finished() => break,
                Some(turn) => turn.state,
                None => return Err(AppError::Orchestration("Session has no turn to run".to_string())),
            };

            let outcome = match self.execute(session, cancel).await {
                Ok(outcome) => outcome,
                Err(AppError::Cancelled) => return Ok(self.cancelled(session)),
                Err(e) => return Err(e),
            };

            let turn = current_turn(session)?;
            let transition = next_state(state, outcome, turn.counters, self.config.limits)?;
            self.apply(turn, transition);

            tracing::info!(
                from = %state,
                to = %turn.state,
                retrievals = turn.counters.retrievals,
                generations = turn.counters.generations,
                transitions = turn.counters.transitions,
                "Transition"
            );

            session.updated_at = Utc::now();
            self.commit(session, cancel).await;
        }

        TurnReport::from_session(session)
            .map(TurnOutcome::Completed)
            .ok_or_else(|| AppError::Orchestration("Finished turn has no answer".to_string()))
    }

    fn cancelled(&self, session: &Session) -> TurnOutcome {
        tracing::info!("Turn cancelled");
        TurnOutcome::Cancelled {
            session_id: session.id.clone(),
        }
    }

    async fn commit(&self, session: &mut Session, cancel: &CancellationToken) {
        match self.writer.commit(session, cancel).await {
            Ok(()) | Err(AppError::Cancelled) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Continuing without a committed checkpoint");
                session.durability_degraded = true;
            }
        }
    }

    /// Run the turn's current state once.
    async fn execute(&self, session: &mut Session, cancel: &CancellationToken) -> AppResult<StepOutcome> {
        let conversation = session.conversation(self.config.history_turns);
        let turn = current_turn(session)?;

        match turn.state {
            State::Retrieve => {
                turn.counters.retrievals += 1;
                let ranked = self
                    .ranker
                    .rank(&turn.current_query, turn.retrieval_window, self.config.dense_weight, cancel)
                    .await;

                match ranked {
                    Ok(documents) => {
                        turn.documents = documents;
                        Ok(StepOutcome::Retrieved)
                    }
                    Err(AppError::Cancelled) => Err(AppError::Cancelled),
                    Err(e) => {
                        tracing::warn!(error = %e, "Retrieval unavailable");
                        turn.documents.clear();
                        Ok(StepOutcome::RetrievalUnavailable)
                    }
                }
            }

            State::Grade => {
                let graded = self
                    .grader
                    .grade(&turn.current_query, &turn.documents, cancel)
                    .await?;

                for doc in graded.documents.iter().filter(|d| !d.is_relevant()) {
                    if !turn.rejected_documents.contains(&doc.id) {
                        turn.rejected_documents.push(doc.id.clone());
                    }
                }
                turn.consider_best(&graded.documents);
                turn.documents = graded.documents;

                if graded.verdict == GradeVerdict::Insufficient {
                    let query = turn.current_query.clone();
                    turn.reject_query(&query, RejectionReason::InsufficientEvidence);
                }
                Ok(StepOutcome::Graded(graded.verdict))
            }

            State::Rewrite => {
                let request = RewriteRequest {
                    original: turn.original_query.clone(),
                    current: turn.current_query.clone(),
                    history: turn.rewrites.iter().map(|r| r.query.clone()).collect(),
                    conversation,
                    avoid: avoid_excerpts(turn),
                    diversify: false,
                };

                match self.rewriter.rewrite(request, cancel).await {
                    Ok(query) => {
                        turn.current_query = query;
                        Ok(StepOutcome::Rewritten)
                    }
                    Err(AppError::RewriteExhausted { attempts }) => {
                        tracing::warn!(attempts, "No novel query could be produced");
                        Ok(StepOutcome::RewriteExhausted)
                    }
                    Err(e) => Err(e),
                }
            }

            State::Generate => {
                turn.counters.generations += 1;
                match self
                    .generator
                    .generate(&turn.original_query, &turn.evidence, cancel)
                    .await
                {
                    Ok(candidate) => {
                        turn.candidate = Some(candidate);
                        Ok(StepOutcome::Generated)
                    }
                    Err(AppError::GenerationFailed(reason)) => {
                        tracing::warn!(
                            attempt = turn.counters.generations,
                            reason = %reason,
                            "Generation failed"
                        );
                        Ok(StepOutcome::GenerationFailed)
                    }
                    Err(e) => Err(e),
                }
            }

            State::Verify => {
                let candidate = turn.candidate.as_ref().ok_or_else(|| {
                    AppError::Orchestration("Nothing to verify: no candidate answer".to_string())
                })?;
                let verdict = self.verifier.verify(candidate, cancel).await?;
                turn.last_verdict = Some(verdict);
                Ok(StepOutcome::Verified(verdict))
            }

            State::End => Err(AppError::Orchestration("Turn already ended".to_string())),
        }
    }

    /// Move the turn along `transition`.
    fn apply(&self, turn: &mut Turn, transition: Transition) {
        let from = turn.state;
        turn.counters.transitions += 1;
        turn.state = transition.target();

        match transition {
            Transition::Retrieve => {
                turn.retrieval_window = if from == State::Verify {
                    self.config.top_k * (turn.counters.retrievals as usize + 1)
                } else {
                    self.config.top_k
                };
            }
            Transition::Generate { evidence, degraded } => {
                match evidence {
                    EvidenceChoice::Accepted => turn.evidence = turn.accepted_evidence(),
                    EvidenceChoice::BestAvailable => turn.evidence = turn.best_available_evidence(),
                    EvidenceChoice::Empty => turn.evidence.clear(),
                    EvidenceChoice::Keep => {}
                }
                if let Some(reason) = degraded {
                    turn.flags.degrade(reason);
                }
            }
            Transition::End(ending) => finish(turn, ending),
            Transition::Grade | Transition::Rewrite | Transition::Verify => {}
        }
    }
}

fn current_turn(session: &mut Session) -> AppResult<&mut Turn> {
    session
        .current_turn_mut()
        .ok_or_else(|| AppError::Orchestration("Session has no turn to run".to_string()))
}

fn avoid_excerpts(turn: &Turn) -> Vec<String> {
    turn.documents
        .iter()
        .filter(|d| !d.is_relevant())
        .map(|d| d.content.chars().take(AVOID_EXCERPT_CHARS).collect())
        .collect()
}

fn finish(turn: &mut Turn, ending: Ending) {
    let answer = match ending {
        Ending::Grounded => {
            // A verified answer stands on its own evidence.
            turn.flags = TurnFlags::default();
            turn.candidate.as_ref().map(|c| Answer {
                text: c.text.clone(),
                citations: c.citations.clone(),
                verdict: Some(GroundVerdict::Grounded),
                caveat: None,
            })
        }
        Ending::Degraded(reason) => {
            turn.flags.degrade(reason);
            turn.candidate.as_ref().map(|c| Answer {
                text: c.text.clone(),
                citations: c.citations.clone(),
                verdict: turn.last_verdict,
                caveat: turn.flags.caveat(),
            })
        }
        Ending::Failed => {
            turn.flags.failed = true;
            None
        }
    };

    turn.final_answer = Some(answer.unwrap_or_else(|| Answer {
        text: FALLBACK_ANSWER.to_string(),
        citations: Vec::new(),
        verdict: None,
        caveat: turn.flags.caveat(),
    }));
    turn.finished_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Counters;

    fn counters(retrievals: u32, generations: u32) -> Counters {
        Counters {
            retrievals,
            generations,
            transitions: 0,
        }
    }

    fn step(state: State, outcome: StepOutcome, r: u32, g: u32) -> Transition {
        next_state(state, outcome, counters(r, g), Limits::default()).unwrap()
    }

    #[test]
    fn test_retrieve_transitions() {
        assert_eq!(step(State::Retrieve, StepOutcome::Retrieved, 1, 0), Transition::Grade);
        assert_eq!(
            step(State::Retrieve, StepOutcome::RetrievalUnavailable, 1, 0),
            Transition::Generate {
                evidence: EvidenceChoice::Empty,
                degraded: Some(DegradedReason::RetrievalUnavailable),
            }
        );
    }

    #[test]
    fn test_grade_rewrites_until_retrievals_run_out() {
        let insufficient = StepOutcome::Graded(GradeVerdict::Insufficient);
        assert_eq!(step(State::Grade, insufficient, 2, 0), Transition::Rewrite);
        assert_eq!(
            step(State::Grade, insufficient, 3, 0),
            Transition::Generate {
                evidence: EvidenceChoice::BestAvailable,
                degraded: Some(DegradedReason::RetrievalExhausted),
            }
        );
        assert_eq!(
            step(State::Grade, StepOutcome::Graded(GradeVerdict::Sufficient), 3, 0),
            Transition::Generate {
                evidence: EvidenceChoice::Accepted,
                degraded: None,
            }
        );
    }

    #[test]
    fn test_generation_failures_are_bounded() {
        assert!(matches!(
            step(State::Generate, StepOutcome::GenerationFailed, 1, 1),
            Transition::Generate { evidence: EvidenceChoice::Keep, .. }
        ));
        assert_eq!(
            step(State::Generate, StepOutcome::GenerationFailed, 1, 2),
            Transition::End(Ending::Failed)
        );
    }

    #[test]
    fn test_verify_transitions() {
        let verified = |v| StepOutcome::Verified(v);
        assert_eq!(
            step(State::Verify, verified(GroundVerdict::Grounded), 1, 2),
            Transition::End(Ending::Grounded)
        );
        assert!(matches!(
            step(State::Verify, verified(GroundVerdict::Unsupported), 1, 1),
            Transition::Generate { .. }
        ));
        assert_eq!(
            step(State::Verify, verified(GroundVerdict::Unsupported), 1, 2),
            Transition::End(Ending::Degraded(DegradedReason::UnsupportedAnswer))
        );
        assert_eq!(
            step(State::Verify, verified(GroundVerdict::NeedsMoreEvidence), 1, 1),
            Transition::Retrieve
        );
        // Another retrieval is pointless without a generation left
        assert_eq!(
            step(State::Verify, verified(GroundVerdict::NeedsMoreEvidence), 1, 2),
            Transition::End(Ending::Degraded(DegradedReason::EvidenceExhausted))
        );
        assert_eq!(
            step(State::Verify, verified(GroundVerdict::NeedsMoreEvidence), 3, 1),
            Transition::End(Ending::Degraded(DegradedReason::EvidenceExhausted))
        );
    }

    #[test]
    fn test_transition_budget_forces_end() {
        let limits = Limits::default();
        let spent = Counters {
            retrievals: 0,
            generations: 0,
            transitions: limits.transition_budget(),
        };
        assert_eq!(
            next_state(State::Retrieve, StepOutcome::Retrieved, spent, limits).unwrap(),
            Transition::End(Ending::Degraded(DegradedReason::TransitionBudget))
        );
        assert_eq!(limits.transition_budget(), 3 * 3 + 2 * 2 + 3);
    }

    #[test]
    fn test_mismatched_outcome_is_an_error() {
        let err = next_state(State::Grade, StepOutcome::Generated, counters(1, 0), Limits::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Orchestration(_)));
    }

    #[test]
    fn test_finish_failed_uses_fallback() {
        let mut turn = Turn::new(0, "q", 5);
        finish(&mut turn, Ending::Failed);
        let answer = turn.final_answer.unwrap();
        assert_eq!(answer.text, FALLBACK_ANSWER);
        assert!(turn.flags.failed);
        assert!(turn.finished_at.is_some());
    }

    #[test]
    fn test_finish_grounded_clears_earlier_degradation() {
        let mut turn = Turn::new(0, "q", 5);
        turn.flags.degrade(DegradedReason::RetrievalExhausted);
        turn.candidate = Some(crate::types::CandidateAnswer {
            text: "answer [1]".to_string(),
            evidence: Vec::new(),
            citations: Vec::new(),
        });

        finish(&mut turn, Ending::Grounded);
        let answer = turn.final_answer.unwrap();
        assert_eq!(answer.text, "answer [1]");
        assert!(answer.caveat.is_none());
        assert!(!turn.flags.degraded);
    }

    #[test]
    fn test_finish_degraded_keeps_candidate_with_caveat() {
        let mut turn = Turn::new(0, "q", 5);
        turn.candidate = Some(crate::types::CandidateAnswer {
            text: "partial".to_string(),
            evidence: Vec::new(),
            citations: Vec::new(),
        });
        turn.last_verdict = Some(GroundVerdict::Unsupported);

        finish(&mut turn, Ending::Degraded(DegradedReason::UnsupportedAnswer));
        let answer = turn.final_answer.unwrap();
        assert_eq!(answer.text, "partial");
        assert_eq!(answer.caveat.as_deref(), Some(DegradedReason::UnsupportedAnswer.caveat()));
        assert!(turn.flags.degraded);
        assert!(!turn.flags.failed);
    }
}
