//! Prompt types for Recall.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A prompt definition, built in or loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// System message sent alongside the rendered template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Template string with Handlebars syntax
    pub template: String,

    #[serde(default)]
    pub output: PromptOutputSpec,
}

/// Sampling hints for the model call that consumes the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format (e.g., "text", "verdict")
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(rename = "maxTokens", default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for PromptOutputSpec {
    fn default() -> Self {
        Self {
            format: default_format(),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Where a prompt definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptOrigin {
    Builtin,
    Workspace,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub system: Option<String>,

    pub user: String,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Template variables that were resolved
    #[serde(rename = "resolvedVariables")]
    pub resolved_variables: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: rag.grade
title: Strict grader
apiVersion: "1.0"
system: "You grade documents."
template: "{{query}} / {{document}}"
output:
  format: verdict
  maxTokens: 3
  temperature: 0.0
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "rag.grade");
        assert_eq!(def.system.as_deref(), Some("You grade documents."));
        assert_eq!(def.output.max_tokens, Some(3));
        assert_eq!(def.output.temperature, Some(0.0));
    }

    #[test]
    fn test_output_spec_is_optional() {
        let yaml = r#"
id: rag.rewrite
title: Rewriter
apiVersion: "1.0"
template: "{{query}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.system.is_none());
        assert_eq!(def.output.format, "text");
        assert!(def.output.max_tokens.is_none());
    }
}
