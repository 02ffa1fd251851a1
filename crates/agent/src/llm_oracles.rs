//! The four oracles backed by a language model.
//!
//! Each call renders a `recall-prompt` definition, sends one completion
//! request and parses the reply leniently: an unparseable grade counts as
//! irrelevant and an unparseable verification as unsupported.

use crate::oracles::{
    EntailmentOracle, InferenceBackend, JudgmentOracle, PromptSections, RewriteOracle,
    RewriteRequest,
};
use crate::types::{GroundVerdict, RankedDocument};
use recall_core::{AppError, AppResult};
use recall_llm::{LlmClient, LlmRequest};
use recall_prompt::defaults::builtin_prompt;
use recall_prompt::{
    build_prompt, load_prompt, PromptDefinition, GENERATE_PROMPT_ID, GRADE_PROMPT_ID,
    REWRITE_PROMPT_ID, VERIFY_PROMPT_ID,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub struct LlmOracles {
    client: Arc<dyn LlmClient>,
    model: String,
    grade: PromptDefinition,
    rewrite: PromptDefinition,
    generate: PromptDefinition,
    verify: PromptDefinition,
}

impl LlmOracles {
    /// Oracles using the built-in prompts.
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> AppResult<Self> {
        let builtin = |id: &str| {
            builtin_prompt(id).ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))
        };

        Ok(Self {
            client,
            model: model.into(),
            grade: builtin(GRADE_PROMPT_ID)?,
            rewrite: builtin(REWRITE_PROMPT_ID)?,
            generate: builtin(GENERATE_PROMPT_ID)?,
            verify: builtin(VERIFY_PROMPT_ID)?,
        })
    }

    /// Oracles using the workspace's prompt overrides where present.
    pub fn from_workspace(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        workspace: &Path,
    ) -> AppResult<Self> {
        let load = |id: &str| load_prompt(workspace, id).map(|(definition, _)| definition);

        Ok(Self {
            client,
            model: model.into(),
            grade: load(GRADE_PROMPT_ID)?,
            rewrite: load(REWRITE_PROMPT_ID)?,
            generate: load(GENERATE_PROMPT_ID)?,
            verify: load(VERIFY_PROMPT_ID)?,
        })
    }

    async fn complete(
        &self,
        definition: &PromptDefinition,
        variables: HashMap<String, String>,
    ) -> AppResult<String> {
        let built = build_prompt(definition, variables)?;

        let mut request = LlmRequest::new(built.user, &self.model);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(max_tokens) = built.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = built.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.client.complete(&request).await?;
        tracing::trace!(
            prompt = %built.source_prompt_id,
            tokens = response.usage.total_tokens,
            "Oracle call complete"
        );
        Ok(response.content)
    }
}

fn vars<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_evidence(evidence: &[RankedDocument]) -> String {
    evidence
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] (source: {})\n{}", i + 1, doc.source, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// True only for an explicit yes.
pub fn parse_yes_no(reply: &str) -> bool {
    let first = reply
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    matches!(first.as_str(), "yes" | "y" | "relevant" | "true")
}

/// The verdict keyword the reply opens with, after an optional `Verdict:` label.
///
/// Only a leading keyword counts, so a reply like "NOT GROUNDED" or prose
/// that merely mentions a keyword falls back to [`GroundVerdict::Unsupported`].
pub fn parse_verdict(reply: &str) -> GroundVerdict {
    let upper = reply.to_uppercase();
    let mut words = upper
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .skip_while(|w| *w == "VERDICT");

    match words.next() {
        Some("GROUNDED") => GroundVerdict::Grounded,
        Some("NEEDS_MORE_EVIDENCE") => GroundVerdict::NeedsMoreEvidence,
        Some("NEEDS") if words.next() == Some("MORE") && words.next() == Some("EVIDENCE") => {
            GroundVerdict::NeedsMoreEvidence
        }
        _ => GroundVerdict::Unsupported,
    }
}

/// The first non-empty line, without a label or surrounding quotes.
pub fn parse_rewrite(reply: &str) -> String {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    let line = match line.split_once(':') {
        Some((label, rest)) if label.to_lowercase().contains("query") => rest.trim(),
        _ => line,
    };

    line.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

#[async_trait::async_trait]
impl JudgmentOracle for LlmOracles {
    async fn judge(&self, query: &str, document: &RankedDocument) -> AppResult<bool> {
        let reply = self
            .complete(
                &self.grade,
                vars([
                    ("query", query.to_string()),
                    ("document", document.content.clone()),
                    ("source", document.source.clone()),
                ]),
            )
            .await?;
        Ok(parse_yes_no(&reply))
    }
}

#[async_trait::async_trait]
impl RewriteOracle for LlmOracles {
    async fn rewrite(&self, request: &RewriteRequest) -> AppResult<String> {
        let conversation = request
            .conversation
            .iter()
            .map(|t| format!("Q: {}\nA: {}", t.query, t.answer))
            .collect::<Vec<_>>()
            .join("\n");

        let reply = self
            .complete(
                &self.rewrite,
                vars([
                    ("original", request.original.clone()),
                    ("current", request.current.clone()),
                    ("rejected", bullet_list(&request.history)),
                    ("avoid", bullet_list(&request.avoid)),
                    ("conversation", conversation),
                    ("diversify", if request.diversify { "true".to_string() } else { String::new() }),
                ]),
            )
            .await?;
        Ok(parse_rewrite(&reply))
    }
}

#[async_trait::async_trait]
impl InferenceBackend for LlmOracles {
    async fn generate(&self, sections: &PromptSections, budget: usize) -> AppResult<String> {
        if sections.char_len() > budget {
            tracing::warn!(chars = sections.char_len(), budget, "Prompt sections exceed budget");
        }

        self.complete(
            &self.generate,
            vars([
                ("instruction", sections.instruction.clone()),
                ("evidence", sections.evidence.clone()),
                ("query", sections.query.clone()),
            ]),
        )
        .await
    }
}

#[async_trait::async_trait]
impl EntailmentOracle for LlmOracles {
    async fn verify(&self, answer: &str, evidence: &[RankedDocument]) -> AppResult<GroundVerdict> {
        let reply = self
            .complete(
                &self.verify,
                vars([
                    ("answer", answer.to_string()),
                    ("evidence", render_evidence(evidence)),
                ]),
            )
            .await?;
        Ok(parse_verdict(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scored, ScriptedLlm};

    #[test]
    fn test_parse_yes_no() {
        assert!(parse_yes_no("Yes."));
        assert!(parse_yes_no("  yes, it mentions 503"));
        assert!(!parse_yes_no("No"));
        assert!(!parse_yes_no("I think so"));
        assert!(!parse_yes_no(""));
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict("GROUNDED"), GroundVerdict::Grounded);
        assert_eq!(parse_verdict("grounded - all claims hold"), GroundVerdict::Grounded);
        assert_eq!(parse_verdict("UNSUPPORTED"), GroundVerdict::Unsupported);
        assert_eq!(parse_verdict("ungrounded"), GroundVerdict::Unsupported);
        assert_eq!(parse_verdict("Needs more evidence"), GroundVerdict::NeedsMoreEvidence);
        assert_eq!(parse_verdict("Verdict: GROUNDED"), GroundVerdict::Grounded);
        assert_eq!(parse_verdict("NEEDS_MORE_EVIDENCE"), GroundVerdict::NeedsMoreEvidence);
        assert_eq!(parse_verdict("maybe?"), GroundVerdict::Unsupported);
    }

    #[test]
    fn test_parse_verdict_rejects_negated_or_buried_keywords() {
        assert_eq!(
            parse_verdict("The answer is NOT GROUNDED in the evidence."),
            GroundVerdict::Unsupported
        );
        assert_eq!(parse_verdict("NOT GROUNDED"), GroundVerdict::Unsupported);
        assert_eq!(parse_verdict("No, not grounded."), GroundVerdict::Unsupported);
        assert_eq!(
            parse_verdict("It would be GROUNDED if the evidence said so."),
            GroundVerdict::Unsupported
        );
    }

    #[test]
    fn test_parse_rewrite() {
        assert_eq!(parse_rewrite("\n  \"http 503 meaning\"\nextra"), "http 503 meaning");
        assert_eq!(parse_rewrite("New query: server unavailable 503"), "server unavailable 503");
        assert_eq!(parse_rewrite("   "), "");
    }

    #[tokio::test]
    async fn test_judge_sends_greedy_request() {
        let llm = Arc::new(ScriptedLlm::new(["yes"]));
        let oracles = LlmOracles::new(llm.clone(), "llama3").unwrap();

        let relevant = oracles
            .judge("What is Error 503?", &scored("a", "503 Service Unavailable", 1.0))
            .await
            .unwrap();
        assert!(relevant);

        let request = &llm.requests()[0];
        assert_eq!(request.model, "llama3");
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.prompt.contains("503 Service Unavailable"));
        assert!(request.prompt.contains("a.md"));
    }

    #[tokio::test]
    async fn test_rewrite_includes_history_and_diversify() {
        let llm = Arc::new(ScriptedLlm::new(["http 503 meaning"]));
        let oracles = LlmOracles::new(llm.clone(), "llama3").unwrap();

        let rewritten = oracles
            .rewrite(&RewriteRequest {
                original: "What is Error 503?".to_string(),
                current: "What is Error 503?".to_string(),
                history: vec!["What is Error 503?".to_string()],
                diversify: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(rewritten, "http 503 meaning");
        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.contains("- What is Error 503?"));
        assert!(prompt.contains("different wording"));
    }

    #[tokio::test]
    async fn test_generate_uses_system_prompt_and_sections() {
        let llm = Arc::new(ScriptedLlm::new(["503 means unavailable [1]"]));
        let oracles = LlmOracles::new(llm.clone(), "llama3").unwrap();

        let sections = PromptSections {
            instruction: "Answer.".to_string(),
            evidence: "[1] (source: a.md)\n503 Service Unavailable".to_string(),
            query: "What is Error 503?".to_string(),
        };
        let text = oracles.generate(&sections, 4000).await.unwrap();

        assert_eq!(text, "503 means unavailable [1]");
        let request = &llm.requests()[0];
        assert!(request.system.is_some());
        assert!(request.prompt.contains("Question: What is Error 503?"));
    }

    #[tokio::test]
    async fn test_llm_errors_propagate() {
        let llm = Arc::new(ScriptedLlm::failing());
        let oracles = LlmOracles::new(llm, "llama3").unwrap();
        let result = oracles.verify("answer", &[scored("a", "x", 1.0)]).await;
        assert!(result.is_err());
    }
}
