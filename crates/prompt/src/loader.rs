//! Prompt loader: workspace YAML overrides first, built-ins second.

use crate::defaults::{builtin_prompt, BUILTIN_PROMPT_IDS};
use crate::types::{PromptDefinition, PromptOrigin};
use recall_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".recall").join("prompts")
}

/// Load a prompt definition by ID.
///
/// Looks for `<id>.yml` in `.recall/prompts/` and falls back to the built-in
/// definition of the same ID.
///
/// # Example
/// ```no_run
/// use recall_prompt::{load_prompt, GRADE_PROMPT_ID};
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (prompt, origin) = load_prompt(Path::new("."), GRADE_PROMPT_ID)?;
/// println!("Loaded prompt: {} ({:?})", prompt.title, origin);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(
    workspace_path: &Path,
    prompt_id: &str,
) -> AppResult<(PromptDefinition, PromptOrigin)> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to parse prompt YAML {:?}: {}",
                prompt_file, e
            ))
        })?;

        validate_prompt(&definition, prompt_id)?;
        tracing::info!("Loaded workspace prompt: {} ({})", definition.id, definition.title);
        return Ok((definition, PromptOrigin::Workspace));
    }

    builtin_prompt(prompt_id)
        .map(|definition| (definition, PromptOrigin::Builtin))
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
}

/// List all available prompt IDs with their origin, sorted by ID.
///
/// Workspace files shadow built-ins of the same ID.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<(String, PromptOrigin)>> {
    let mut prompts: Vec<(String, PromptOrigin)> = BUILTIN_PROMPT_IDS
        .iter()
        .map(|id| (id.to_string(), PromptOrigin::Builtin))
        .collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("yml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompts.retain(|(id, _)| id != stem);
                prompts.push((stem.to_string(), PromptOrigin::Workspace));
            }
        }
    }

    prompts.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(prompts)
}

fn validate_prompt(def: &PromptDefinition, expected_id: &str) -> AppResult<()> {
    if def.id != expected_id {
        return Err(AppError::Prompt(format!(
            "Prompt file for {} declares id {}",
            expected_id, def.id
        )));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
