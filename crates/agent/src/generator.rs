//! Answer generation under a character budget.

use crate::guard::guarded;
use crate::oracles::{InferenceBackend, PromptSections};
use crate::types::{CandidateAnswer, Citation, RankedDocument};
use recall_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_INSTRUCTION: &str = "Answer the question using only the numbered evidence. \
Cite the evidence you rely on as [n]. If the evidence does not contain the answer, say so plainly.";

/// Evidence text shown when there is nothing to cite.
pub const NO_EVIDENCE: &str = "(no supporting documents were found)";

pub struct AnswerGenerator {
    backend: Arc<dyn InferenceBackend>,
    timeout: Duration,
    budget: usize,
    instruction: String,
}

impl AnswerGenerator {
    pub fn new(backend: Arc<dyn InferenceBackend>, timeout: Duration, budget: usize) -> Self {
        Self {
            backend,
            timeout,
            budget,
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Generate one candidate answer for `query` from `evidence`.
    ///
    /// Backend errors, timeouts and blank output all become
    /// [`AppError::GenerationFailed`]; cancellation is passed through.
    pub async fn generate(
        &self,
        query: &str,
        evidence: &[RankedDocument],
        cancel: &CancellationToken,
    ) -> AppResult<CandidateAnswer> {
        let (sections, used) = self.build_sections(query, evidence);

        tracing::debug!(
            evidence = used.len(),
            offered = evidence.len(),
            prompt_chars = sections.char_len(),
            "Generating answer"
        );

        let text = match guarded(
            "answer generation",
            self.timeout,
            cancel,
            self.backend.generate(&sections, self.budget),
        )
        .await
        {
            Ok(text) => text,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => return Err(AppError::GenerationFailed(e.to_string())),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::GenerationFailed(
                "inference backend returned an empty answer".to_string(),
            ));
        }

        let citations = used
            .iter()
            .enumerate()
            .map(|(i, doc)| Citation {
                index: i + 1,
                document_id: doc.id.clone(),
                source: doc.source.clone(),
            })
            .collect();

        Ok(CandidateAnswer {
            text: text.to_string(),
            evidence: used,
            citations,
        })
    }

    /// Lay out the prompt sections and return the evidence that fit.
    ///
    /// Documents are taken best-first; the lowest-scored ones are dropped
    /// until the prompt fits, and a lone remaining document is truncated.
    pub fn build_sections(
        &self,
        query: &str,
        evidence: &[RankedDocument],
    ) -> (PromptSections, Vec<RankedDocument>) {
        let mut docs: Vec<RankedDocument> = evidence.to_vec();
        docs.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(Ordering::Equal)
        });

        let fixed = self.instruction.chars().count() + query.chars().count();
        let available = self.budget.saturating_sub(fixed);

        while docs.len() > 1 && render_evidence(&docs).chars().count() > available {
            docs.pop();
        }

        if let Some(only) = docs.first_mut() {
            let rendered = render_evidence(std::slice::from_ref(only)).chars().count();
            if rendered > available {
                let overflow = rendered - available;
                let keep = only.content.chars().count().saturating_sub(overflow);
                if keep == 0 {
                    docs.clear();
                } else {
                    only.content = truncate_chars(&only.content, keep).to_string();
                }
            }
        }

        let sections = PromptSections {
            instruction: self.instruction.clone(),
            evidence: if docs.is_empty() {
                NO_EVIDENCE.to_string()
            } else {
                render_evidence(&docs)
            },
            query: query.to_string(),
        };

        (sections, docs)
    }
}

fn render_evidence(docs: &[RankedDocument]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] (source: {})\n{}", i + 1, doc.source, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
