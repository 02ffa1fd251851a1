//! Session, turn and evidence types.
//!
//! Everything here is serializable: a [`Session`] is exactly what the
//! checkpoint store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Answer given when a turn fails outright.
pub const FALLBACK_ANSWER: &str = "I couldn't find an answer to your question.";

/// Orchestration states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Retrieve,
    Grade,
    Rewrite,
    Generate,
    Verify,
    End,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieve => "RETRIEVE",
            Self::Grade => "GRADE",
            Self::Rewrite => "REWRITE",
            Self::Generate => "GENERATE",
            Self::Verify => "VERIFY",
            Self::End => "END",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    #[default]
    Unset,
    Relevant,
    Irrelevant,
}

/// One entry of a fused ranking.
///
/// Produced by the ranker and never mutated afterwards; grading yields new
/// copies with the verdict set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDocument {
    pub id: String,
    pub content: String,
    pub source: String,

    /// Raw dense score, if the document was in the dense list
    pub dense_score: Option<f32>,

    /// Raw sparse score, if the document was in the sparse list
    pub sparse_score: Option<f32>,

    /// 0-based position in the dense list
    pub dense_rank: Option<usize>,

    pub fused_score: f32,

    #[serde(default)]
    pub relevance: Relevance,
}

impl RankedDocument {
    /// A copy of this document carrying a relevance verdict.
    pub fn graded(&self, relevant: bool) -> Self {
        Self {
            relevance: if relevant {
                Relevance::Relevant
            } else {
                Relevance::Irrelevant
            },
            ..self.clone()
        }
    }

    pub fn is_relevant(&self) -> bool {
        self.relevance == Relevance::Relevant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeVerdict {
    Sufficient,
    Insufficient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroundVerdict {
    Grounded,
    Unsupported,
    NeedsMoreEvidence,
}

impl fmt::Display for GroundVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grounded => "GROUNDED",
            Self::Unsupported => "UNSUPPORTED",
            Self::NeedsMoreEvidence => "NEEDS_MORE_EVIDENCE",
        })
    }
}

/// Why a query was set aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Its retrieval was graded insufficient
    InsufficientEvidence,
}

/// A query tried during a turn and rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteAttempt {
    pub query: String,
    pub reason: RejectionReason,
    pub at: DateTime<Utc>,
}

/// Case-insensitive, whitespace-collapsed form used to compare queries.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based evidence number as shown to the model
    pub index: usize,
    pub document_id: String,
    pub source: String,
}

/// A generated answer and the exact evidence it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAnswer {
    pub text: String,
    pub evidence: Vec<RankedDocument>,
    pub citations: Vec<Citation>,
}

/// The answer a turn ends with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,

    /// Verifier verdict on `text`, when it was verified
    pub verdict: Option<GroundVerdict>,

    /// User-visible note attached to a degraded answer
    pub caveat: Option<String>,
}

/// Why a turn ended degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Both retrieval modes failed; generated without evidence
    RetrievalUnavailable,
    /// Retrieval bound reached without sufficient evidence
    RetrievalExhausted,
    /// No novel query could be produced
    RewriteExhausted,
    /// Generation bound reached with an unverified answer
    UnsupportedAnswer,
    /// More evidence was needed but no retrieval or generation remained
    EvidenceExhausted,
    /// Hard transition budget reached
    TransitionBudget,
}

impl DegradedReason {
    pub fn caveat(&self) -> &'static str {
        match self {
            Self::RetrievalUnavailable => {
                "Note: the document index could not be searched, so this answer is not based on any sources."
            }
            Self::RetrievalExhausted | Self::RewriteExhausted => {
                "Note: no clearly relevant sources were found; this answer is based on limited evidence."
            }
            Self::UnsupportedAnswer => {
                "Note: parts of this answer could not be verified against the retrieved sources."
            }
            Self::EvidenceExhausted => {
                "Note: the available sources may not be sufficient to fully answer this question."
            }
            Self::TransitionBudget => "Note: answering stopped early; this answer may be incomplete.",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnFlags {
    pub degraded: bool,
    pub failed: bool,
    pub reasons: Vec<DegradedReason>,
}

impl TurnFlags {
    pub fn degrade(&mut self, reason: DegradedReason) {
        self.degraded = true;
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    /// Caveat text for all recorded reasons, or None when not degraded.
    pub fn caveat(&self) -> Option<String> {
        let mut notes: Vec<&str> = Vec::new();
        for reason in &self.reasons {
            let note = reason.caveat();
            if !notes.contains(&note) {
                notes.push(note);
            }
        }
        (!notes.is_empty()).then(|| notes.join(" "))
    }
}

/// Executions counted against the turn's bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// RETRIEVE executions
    pub retrievals: u32,
    /// GENERATE executions
    pub generations: u32,
    /// Transitions taken
    pub transitions: u32,
}

/// One question and everything the loop did to answer it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    pub original_query: String,

    /// Query used by the next retrieval
    pub current_query: String,

    pub state: State,
    pub counters: Counters,

    /// Documents requested from the next retrieval
    pub retrieval_window: usize,

    pub rewrites: Vec<RewriteAttempt>,

    /// Latest ranking, graded once GRADE has run
    pub documents: Vec<RankedDocument>,

    /// Graded set with the most relevant documents so far
    pub best_documents: Vec<RankedDocument>,

    /// Ids of documents judged irrelevant anywhere in the turn
    pub rejected_documents: Vec<String>,

    /// Evidence handed to the next generation
    pub evidence: Vec<RankedDocument>,

    pub candidate: Option<CandidateAnswer>,
    pub last_verdict: Option<GroundVerdict>,
    pub final_answer: Option<Answer>,
    pub flags: TurnFlags,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(index: usize, query: &str, retrieval_window: usize) -> Self {
        Self {
            index,
            original_query: query.to_string(),
            current_query: query.to_string(),
            state: State::Retrieve,
            counters: Counters::default(),
            retrieval_window,
            rewrites: Vec::new(),
            documents: Vec::new(),
            best_documents: Vec::new(),
            rejected_documents: Vec::new(),
            evidence: Vec::new(),
            candidate: None,
            last_verdict: None,
            final_answer: None,
            flags: TurnFlags::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Record `query` as rejected unless an equal query already is.
    pub fn reject_query(&mut self, query: &str, reason: RejectionReason) {
        let normalized = normalize_query(query);
        if self
            .rewrites
            .iter()
            .any(|r| normalize_query(&r.query) == normalized)
        {
            return;
        }
        self.rewrites.push(RewriteAttempt {
            query: query.to_string(),
            reason,
            at: Utc::now(),
        });
    }

    /// Keep `graded` as best evidence if it has at least as many relevant documents.
    pub fn consider_best(&mut self, graded: &[RankedDocument]) {
        let relevant = |docs: &[RankedDocument]| docs.iter().filter(|d| d.is_relevant()).count();
        if self.best_documents.is_empty() || relevant(graded) >= relevant(&self.best_documents) {
            self.best_documents = graded.to_vec();
        }
    }

    /// Relevant documents of the best graded set, or the whole set if none is relevant.
    pub fn best_available_evidence(&self) -> Vec<RankedDocument> {
        let relevant: Vec<RankedDocument> = self
            .best_documents
            .iter()
            .filter(|d| d.is_relevant())
            .cloned()
            .collect();
        if relevant.is_empty() {
            self.best_documents.clone()
        } else {
            relevant
        }
    }

    /// Relevant documents of the latest ranking.
    pub fn accepted_evidence(&self) -> Vec<RankedDocument> {
        self.documents
            .iter()
            .filter(|d| d.is_relevant())
            .cloned()
            .collect()
    }
}

/// A completed question and its answer, as conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub answer: String,
}

/// A conversation: ordered turns plus session-wide flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,

    /// A checkpoint write failed after retries at some point
    pub durability_degraded: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            turns: Vec::new(),
            durability_degraded: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn current_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn current_turn_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    /// State of the latest turn, if any.
    pub fn state(&self) -> Option<State> {
        self.current_turn().map(|t| t.state)
    }

    /// True when no turn is in progress.
    pub fn is_idle(&self) -> bool {
        self.current_turn().map_or(true, Turn::is_finished)
    }

    /// Start a new turn for `query`.
    pub fn begin_turn(&mut self, query: &str, retrieval_window: usize) -> &mut Turn {
        let index = self.turns.len();
        self.turns.push(Turn::new(index, query, retrieval_window));
        self.updated_at = Utc::now();
        let last = self.turns.len() - 1;
        &mut self.turns[last]
    }

    /// Up to `limit` most recent finished turns before the current one, oldest first.
    pub fn conversation(&self, limit: usize) -> Vec<ConversationTurn> {
        let finished: Vec<ConversationTurn> = self
            .turns
            .iter()
            .filter(|t| t.is_finished())
            .filter_map(|t| {
                t.final_answer.as_ref().map(|a| ConversationTurn {
                    query: t.original_query.clone(),
                    answer: a.text.clone(),
                })
            })
            .collect();
        let skip = finished.len().saturating_sub(limit);
        finished.into_iter().skip(skip).collect()
    }
}

/// Summary of a finished turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub session_id: String,
    pub turn_index: usize,
    pub query: String,
    pub answer: Answer,
    pub flags: TurnFlags,
    pub durability_degraded: bool,
    pub counters: Counters,
    pub rewrites: Vec<RewriteAttempt>,
}

impl TurnReport {
    /// Report for the latest turn of `session`, if it has finished.
    pub fn from_session(session: &Session) -> Option<Self> {
        let turn = session.current_turn()?;
        let answer = turn.final_answer.clone()?;
        Some(Self {
            session_id: session.id.clone(),
            turn_index: turn.index,
            query: turn.original_query.clone(),
            answer,
            flags: turn.flags.clone(),
            durability_degraded: session.durability_degraded,
            counters: turn.counters,
            rewrites: turn.rewrites.clone(),
        })
    }
}

/// How a call to run a turn ended.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed(TurnReport),
    /// The session was cancelled; its last committed checkpoint is intact
    Cancelled { session_id: String },
}
