//! Prompt system for Recall.
//!
//! Every oracle call in the answering loop renders one of four prompts:
//! - `rag.grade`: is this document relevant to the query?
//! - `rag.rewrite`: reformulate a query that retrieved poor evidence
//! - `rag.generate`: answer from instruction, evidence and query sections
//! - `rag.verify`: is the answer supported by the evidence?
//!
//! Each has a built-in definition. A workspace may override any of them with
//! a YAML file at `.recall/prompts/<id>.yml`.

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use defaults::{GENERATE_PROMPT_ID, GRADE_PROMPT_ID, REWRITE_PROMPT_ID, VERIFY_PROMPT_ID};
pub use loader::{list_prompts, load_prompt};
pub use types::{BuiltPrompt, PromptDefinition, PromptOrigin, PromptOutputSpec};
