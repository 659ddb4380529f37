// src/config/mod.rs
// One typed `CoreConfig`, composed of small per-concern sub-configs, loaded
// from the environment with hard defaults so the core starts with zero
// configuration.

pub mod helpers;
pub mod llm;
pub mod observability;
pub mod prompt;
pub mod runtime;
pub mod session;
pub mod tools;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use llm::LlmConfig;
use observability::ObservabilityConfig;
use prompt::PromptConfig;
use runtime::RuntimeConfig;
use session::SessionConfig;
use tools::ToolConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub session: SessionConfig,
    pub runtime: RuntimeConfig,
    pub llm: LlmConfig,
    pub tools: ToolConfig,
    pub observability: ObservabilityConfig,
    pub prompt: PromptConfig,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        // `.env` is optional; ignore a missing file, surface nothing else
        // since every option below has a hard default anyway.
        let _ = dotenvy::dotenv();

        Self {
            session: SessionConfig::from_env(),
            runtime: RuntimeConfig::from_env(),
            llm: LlmConfig::from_env(),
            tools: ToolConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
            prompt: PromptConfig::from_env(),
        }
    }

    /// Fail-fast validation run once at startup. Each sub-config validates
    /// its own invariants; this just aggregates them so a single bad
    /// setting stops the process before the first turn.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.session.validate()?;
        self.runtime.validate()?;
        self.llm.validate()?;
        self.tools.validate()?;
        self.observability.validate()?;
        self.prompt.validate()?;
        Ok(())
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = CoreConfig::from_env();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn page_size_ordering_is_enforced() {
        let cfg = CoreConfig::from_env();
        assert!(cfg.tools.default_page_size <= cfg.tools.max_page_size);
        assert!(cfg.tools.max_page_size <= cfg.tools.max_rows_per_call);
    }
}
