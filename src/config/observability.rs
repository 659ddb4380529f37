// src/config/observability.rs
// Structured logging configuration.

use serde::{Deserialize, Serialize};

use super::helpers::{env_bool, env_or};
use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `tracing_subscriber::EnvFilter` directive string, e.g. `"info"` or
    /// `"assistant_core=debug,tower_http=info"`.
    pub log_filter: String,
    pub log_json: bool,
    /// Whether turn-level summaries (route taken, iteration count, elapsed
    /// ms) are logged in addition to the per-step spans.
    pub log_turn_summaries: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            log_filter: env_or("LOG_FILTER", "info"),
            log_json: env_bool("LOG_JSON", false),
            log_turn_summaries: env_bool("LOG_TURN_SUMMARIES", true),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.log_filter.trim().is_empty() {
            return Err(CoreError::configuration("log_filter must not be empty"));
        }
        Ok(())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
