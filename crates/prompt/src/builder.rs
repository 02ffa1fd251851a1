//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use recall_core::{AppError, AppResult};
use std::collections::HashMap;

/// Render a prompt definition with the given variables.
///
/// # Example
/// ```no_run
/// use recall_prompt::{build_prompt, load_prompt, GRADE_PROMPT_ID};
/// use std::collections::HashMap;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (def, _) = load_prompt(Path::new("."), GRADE_PROMPT_ID)?;
/// let mut vars = HashMap::new();
/// vars.insert("query".to_string(), "What is Error 503?".to_string());
/// vars.insert("document".to_string(), "503 Service Unavailable".to_string());
/// vars.insert("source".to_string(), "http-codes.md".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt {
        system: definition.system.clone(),
        user,
        max_tokens: definition.output.max_tokens,
        temperature: definition.output.temperature,
        source_prompt_id: definition.id.clone(),
        resolved_variables: variables,
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
