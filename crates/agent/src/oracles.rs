//! Contracts for the black-box collaborators of the answering loop.
//!
//! Implementations must be shareable across concurrently running sessions.
//! Deadlines and cancellation are applied by the caller, so implementations
//! only report their own failures.

use crate::types::{ConversationTurn, GroundVerdict, RankedDocument};
use recall_core::AppResult;
use serde::{Deserialize, Serialize};

/// Decides whether one document helps answer a query.
#[async_trait::async_trait]
pub trait JudgmentOracle: Send + Sync {
    async fn judge(&self, query: &str, document: &RankedDocument) -> AppResult<bool>;
}

/// Everything a rewrite may take into account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteRequest {
    /// The user's question
    pub original: String,

    /// The query whose retrieval was just rejected
    pub current: String,

    /// Every query already rejected in this turn
    pub history: Vec<String>,

    /// Recent finished turns of the conversation
    pub conversation: Vec<ConversationTurn>,

    /// Short excerpts of documents judged irrelevant
    pub avoid: Vec<String>,

    /// The previous proposal repeated an earlier query
    pub diversify: bool,
}

/// Reformulates a query.
#[async_trait::async_trait]
pub trait RewriteOracle: Send + Sync {
    async fn rewrite(&self, request: &RewriteRequest) -> AppResult<String>;
}

/// The three disjoint parts of a generation prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSections {
    pub instruction: String,

    /// Numbered excerpts, each tagged with its source
    pub evidence: String,

    pub query: String,
}

impl PromptSections {
    /// Characters across all three sections.
    pub fn char_len(&self) -> usize {
        self.instruction.chars().count() + self.evidence.chars().count() + self.query.chars().count()
    }
}

/// Produces answer text from prompt sections.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(&self, sections: &PromptSections, budget: usize) -> AppResult<String>;
}

/// Checks an answer against the evidence it was generated from.
#[async_trait::async_trait]
pub trait EntailmentOracle: Send + Sync {
    async fn verify(&self, answer: &str, evidence: &[RankedDocument]) -> AppResult<GroundVerdict>;
}
