// src/config/prompt.rs
// Prompt registry configuration: named templates loaded from an
// external directory, reloaded explicitly rather than watched.

use serde::{Deserialize, Serialize};

use super::helpers::env_or;
use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Directory containing one `<name>.md` file per named template.
    pub templates_dir: String,
}

impl PromptConfig {
    pub fn from_env() -> Self {
        Self {
            templates_dir: env_or("PROMPT_TEMPLATES_DIR", "prompts"),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.templates_dir.trim().is_empty() {
            return Err(CoreError::configuration(
                "prompt templates_dir must not be empty",
            ));
        }
        Ok(())
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
