//! Built-in prompt definitions for the four oracle calls.

use crate::types::{PromptDefinition, PromptOutputSpec};

pub const GRADE_PROMPT_ID: &str = "rag.grade";
pub const REWRITE_PROMPT_ID: &str = "rag.rewrite";
pub const GENERATE_PROMPT_ID: &str = "rag.generate";
pub const VERIFY_PROMPT_ID: &str = "rag.verify";

/// IDs of every built-in prompt.
pub const BUILTIN_PROMPT_IDS: [&str; 4] = [
    GRADE_PROMPT_ID,
    REWRITE_PROMPT_ID,
    GENERATE_PROMPT_ID,
    VERIFY_PROMPT_ID,
];

const GRADE_TEMPLATE: &str = r#"Decide whether the document below contains information that helps answer the question.

Question: {{query}}

Document (source: {{source}}):
{{document}}

Answer with a single word: yes or no."#;

const REWRITE_TEMPLATE: &str = r#"A search for the question below returned no useful documents.
Write one new search query that is more specific and more likely to match relevant documents.
{{#if conversation}}

Earlier in this conversation:
{{conversation}}
{{/if}}

Original question: {{original}}
Last query tried: {{current}}
{{#if rejected}}

These queries were already tried and must not be repeated:
{{rejected}}
{{/if}}
{{#if avoid}}

These documents were retrieved but judged irrelevant:
{{avoid}}
{{/if}}
{{#if diversify}}

Your previous suggestion repeated an earlier query. Use different wording and different key terms this time.
{{/if}}

Reply with the new query only."#;

const GENERATE_SYSTEM: &str = "You answer questions using only the evidence you are given. \
If the evidence does not contain the answer, say so plainly. Cite evidence by its [number].";

const GENERATE_TEMPLATE: &str = r#"{{instruction}}

Evidence:
{{evidence}}

Question: {{query}}

Answer:"#;

const VERIFY_TEMPLATE: &str = r#"Check whether the answer below is supported by the evidence.

Evidence:
{{evidence}}

Answer:
{{answer}}

Reply with exactly one of:
GROUNDED - every claim in the answer is supported by the evidence
UNSUPPORTED - the answer makes claims the evidence does not support
NEEDS_MORE_EVIDENCE - the answer says the evidence is insufficient to answer"#;

/// Look up a built-in prompt definition by ID.
pub fn builtin_prompt(id: &str) -> Option<PromptDefinition> {
    let (title, system, template, output) = match id {
        GRADE_PROMPT_ID => (
            "Document relevance grade",
            None,
            GRADE_TEMPLATE,
            verdict_output(4),
        ),
        REWRITE_PROMPT_ID => (
            "Query rewrite",
            None,
            REWRITE_TEMPLATE,
            PromptOutputSpec {
                max_tokens: Some(64),
                temperature: Some(0.7),
                ..Default::default()
            },
        ),
        GENERATE_PROMPT_ID => (
            "Grounded answer",
            Some(GENERATE_SYSTEM),
            GENERATE_TEMPLATE,
            PromptOutputSpec::default(),
        ),
        VERIFY_PROMPT_ID => (
            "Groundedness check",
            None,
            VERIFY_TEMPLATE,
            verdict_output(8),
        ),
        _ => return None,
    };

    Some(PromptDefinition {
        id: id.to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        system: system.map(str::to_string),
        template: template.to_string(),
        output,
    })
}

fn verdict_output(max_tokens: u32) -> PromptOutputSpec {
    PromptOutputSpec {
        format: "verdict".to_string(),
        max_tokens: Some(max_tokens),
        temperature: Some(0.0),
    }
}
