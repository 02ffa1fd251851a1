use crate::guard::guarded;
use crate::oracles::EntailmentOracle;
use crate::types::{CandidateAnswer, GroundVerdict};
use recall_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Checks candidate answers against the evidence they were generated from.
pub struct GroundednessVerifier {
    oracle: Arc<dyn EntailmentOracle>,
    timeout: Duration,
}

impl GroundednessVerifier {
    pub fn new(oracle: Arc<dyn EntailmentOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Verify `candidate`. An oracle failure or timeout yields `Unsupported`.
    ///
    /// An answer generated without evidence cannot be grounded and is
    /// reported as `NeedsMoreEvidence` without consulting the oracle.
    pub async fn verify(
        &self,
        candidate: &CandidateAnswer,
        cancel: &CancellationToken,
    ) -> AppResult<GroundVerdict> {
        if candidate.evidence.is_empty() {
            tracing::info!("Answer has no evidence to verify against");
            return Ok(GroundVerdict::NeedsMoreEvidence);
        }

        let verdict = guarded(
            "groundedness check",
            self.timeout,
            cancel,
            self.oracle.verify(&candidate.text, &candidate.evidence),
        )
        .await;

        match verdict {
            Ok(verdict) => {
                tracing::info!(%verdict, evidence = candidate.evidence.len(), "Verified answer");
                Ok(verdict)
            }
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "Verification failed, treating answer as unsupported");
                Ok(GroundVerdict::Unsupported)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scored, ScriptedVerifier};

    fn candidate() -> CandidateAnswer {
        CandidateAnswer {
            text: "503 means unavailable".to_string(),
            evidence: vec![scored("a", "503 Service Unavailable", 1.0)],
            citations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_passes_verdict_through() {
        let verifier = GroundednessVerifier::new(
            Arc::new(ScriptedVerifier::new([GroundVerdict::NeedsMoreEvidence])),
            Duration::from_secs(1),
        );
        let verdict = verifier.verify(&candidate(), &CancellationToken::new()).await.unwrap();
        assert_eq!(verdict, GroundVerdict::NeedsMoreEvidence);
    }

    #[tokio::test]
    async fn test_failure_and_timeout_mean_unsupported() {
        let verifier =
            GroundednessVerifier::new(Arc::new(ScriptedVerifier::failing()), Duration::from_secs(1));
        let verdict = verifier.verify(&candidate(), &CancellationToken::new()).await.unwrap();
        assert_eq!(verdict, GroundVerdict::Unsupported);

        let verifier =
            GroundednessVerifier::new(Arc::new(ScriptedVerifier::hanging()), Duration::from_millis(20));
        let verdict = verifier.verify(&candidate(), &CancellationToken::new()).await.unwrap();
        assert_eq!(verdict, GroundVerdict::Unsupported);
    }

    #[tokio::test]
    async fn test_answer_without_evidence_needs_more() {
        let oracle = Arc::new(ScriptedVerifier::new([GroundVerdict::Grounded]));
        let verifier = GroundednessVerifier::new(oracle.clone(), Duration::from_secs(1));
        let mut bare = candidate();
        bare.evidence.clear();

        let verdict = verifier.verify(&bare, &CancellationToken::new()).await.unwrap();
        assert_eq!(verdict, GroundVerdict::NeedsMoreEvidence);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let verifier =
            GroundednessVerifier::new(Arc::new(ScriptedVerifier::hanging()), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = verifier.verify(&candidate(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
