//! Relevance grading of a ranked set.

use crate::guard::guarded;
use crate::oracles::JudgmentOracle;
use crate::types::{GradeVerdict, RankedDocument};
use recall_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A graded copy of a ranking plus its sufficiency verdict.
#[derive(Debug, Clone)]
pub struct GradedSet {
    pub documents: Vec<RankedDocument>,
    pub relevant: usize,
    pub verdict: GradeVerdict,
}

pub struct RelevanceGrader {
    oracle: Arc<dyn JudgmentOracle>,
    timeout: Duration,
    min_relevant: usize,
}

impl RelevanceGrader {
    /// `min_relevant` below 1 is treated as 1.
    pub fn new(oracle: Arc<dyn JudgmentOracle>, timeout: Duration, min_relevant: usize) -> Self {
        Self {
            oracle,
            timeout,
            min_relevant: min_relevant.max(1),
        }
    }

    /// Judge every document independently and concurrently.
    ///
    /// A judgment that errors or times out counts as irrelevant.
    pub async fn grade(
        &self,
        query: &str,
        documents: &[RankedDocument],
        cancel: &CancellationToken,
    ) -> AppResult<GradedSet> {
        let judgments = futures::future::join_all(documents.iter().map(|doc| {
            guarded(
                "relevance judgment",
                self.timeout,
                cancel,
                self.oracle.judge(query, doc),
            )
        }))
        .await;

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let graded: Vec<RankedDocument> = documents
            .iter()
            .zip(judgments)
            .map(|(doc, judgment)| match judgment {
                Ok(relevant) => doc.graded(relevant),
                Err(e) => {
                    tracing::warn!(document = %doc.id, error = %e, "Judgment failed, treating as irrelevant");
                    doc.graded(false)
                }
            })
            .collect();

        let relevant = graded.iter().filter(|d| d.is_relevant()).count();
        let verdict = if relevant >= self.min_relevant {
            GradeVerdict::Sufficient
        } else {
            GradeVerdict::Insufficient
        };

        tracing::info!(
            documents = graded.len(),
            relevant,
            verdict = ?verdict,
            "Graded retrieval"
        );

        Ok(GradedSet {
            documents: graded,
            relevant,
            verdict,
        })
    }
}
