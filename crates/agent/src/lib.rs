//! Self-correcting retrieval-augmented answering.
//!
//! A turn runs as an explicit state machine:
//!
//! ```text
//! RETRIEVE -> GRADE -> (REWRITE -> RETRIEVE)* -> GENERATE -> VERIFY
//!          -> (GENERATE | RETRIEVE)* -> END
//! ```
//!
//! Every loop is bounded by a retrieval or a generation counter, and the
//! session is checkpointed after every transition so an interrupted turn can
//! be resumed. Collaborators (retrieval backend, judgment, rewrite,
//! inference and entailment oracles, checkpoint store) are traits; the
//! [`llm_oracles`] module backs the four oracles with any `LlmClient`.

pub mod checkpoint;
pub mod generator;
pub mod grader;
pub mod guard;
pub mod llm_oracles;
pub mod oracles;
pub mod orchestrator;
pub mod ranker;
pub mod rewriter;
pub mod sessions;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;

pub use checkpoint::{
    CheckpointStore, CheckpointSummary, CheckpointWriter, MemoryCheckpointStore, SessionSnapshot,
    SqliteCheckpointStore,
};
pub use llm_oracles::LlmOracles;
pub use oracles::{
    EntailmentOracle, InferenceBackend, JudgmentOracle, PromptSections, RewriteOracle,
    RewriteRequest,
};
pub use orchestrator::{
    next_state, Collaborators, Ending, EvidenceChoice, Limits, Orchestrator, OrchestratorConfig,
    StepOutcome, Transition,
};
pub use sessions::SessionManager;
pub use types::{
    Answer, CandidateAnswer, Citation, Counters, DegradedReason, GradeVerdict, GroundVerdict,
    RankedDocument, Relevance, RewriteAttempt, Session, State, Turn, TurnFlags, TurnOutcome,
    TurnReport,
};
