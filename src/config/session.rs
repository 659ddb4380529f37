// src/config/session.rs
// Session retention / pruning configuration.

use serde::{Deserialize, Serialize};

use super::helpers::env_parsed;
use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `prune_last_n_messages`: retention window size.
    pub prune_last_n_messages: usize,
    /// `prune_token_budget`: token ceiling before forced pruning.
    pub prune_token_budget: usize,
    /// Rough chars-per-token ratio used to estimate token counts without a
    /// real tokenizer (the core has no model-specific tokenizer dependency).
    pub chars_per_token_estimate: f64,
    /// Session-store row TTL in seconds; `0` disables TTL expiry.
    pub session_ttl_seconds: i64,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            prune_last_n_messages: env_parsed("PRUNE_LAST_N_MESSAGES", 20),
            prune_token_budget: env_parsed("PRUNE_TOKEN_BUDGET", 8_000),
            chars_per_token_estimate: env_parsed("CHARS_PER_TOKEN_ESTIMATE", 4.0),
            session_ttl_seconds: env_parsed("SESSION_TTL_SECONDS", 0),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prune_last_n_messages == 0 {
            return Err(CoreError::configuration(
                "prune_last_n_messages must be >= 1",
            ));
        }
        if self.prune_token_budget == 0 {
            return Err(CoreError::configuration("prune_token_budget must be >= 1"));
        }
        if self.chars_per_token_estimate <= 0.0 {
            return Err(CoreError::configuration(
                "chars_per_token_estimate must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
