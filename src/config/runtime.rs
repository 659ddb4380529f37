// src/config/runtime.rs
// Expert-runtime and turn-level bounds.

use serde::{Deserialize, Serialize};

use super::helpers::{env_bool, env_or, env_parsed};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusySessionPolicy {
    Wait,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// `max_iterations_per_turn`: upper bound on the expert loop.
    pub max_iterations_per_turn: u32,
    /// `handoff_max_per_turn`: re-entries allowed per turn.
    pub handoff_max_per_turn: u32,
    /// `turn_deadline_seconds`: per-turn wall clock.
    pub turn_deadline_seconds: u64,
    /// `busy_session_policy`: `"wait"` or `"reject"`.
    pub busy_session_policy: BusySessionPolicy,
    /// Cap on how long a waiting turn blocks on a busy session before giving
    /// up, when the policy is `Wait` (default: 30s).
    pub busy_wait_cap_seconds: u64,
    /// `default_expert`: fallback routing target.
    pub default_expert: String,
    /// Cap (bytes) on a tool result serialized into a tool-role message
    /// before truncation (default 8 KB).
    pub tool_result_cap_bytes: usize,
    /// `tool_timeout_seconds`: per-tool-dispatch timeout.
    pub tool_timeout_seconds: u64,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let policy = match env_or("BUSY_SESSION_POLICY", "wait").as_str() {
            "reject" => BusySessionPolicy::Reject,
            _ => BusySessionPolicy::Wait,
        };

        Self {
            max_iterations_per_turn: env_parsed("MAX_ITERATIONS_PER_TURN", 10),
            handoff_max_per_turn: env_parsed("HANDOFF_MAX_PER_TURN", 1),
            turn_deadline_seconds: env_parsed("TURN_DEADLINE_SECONDS", 120),
            busy_session_policy: policy,
            busy_wait_cap_seconds: env_parsed("BUSY_WAIT_CAP_SECONDS", 30),
            default_expert: env_or("DEFAULT_EXPERT", "task"),
            tool_result_cap_bytes: env_parsed("TOOL_RESULT_CAP_BYTES", 8 * 1024),
            tool_timeout_seconds: env_parsed("TOOL_TIMEOUT_SECONDS", 30),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_iterations_per_turn == 0 {
            return Err(CoreError::configuration(
                "max_iterations_per_turn must be >= 1",
            ));
        }
        if self.tool_result_cap_bytes == 0 {
            return Err(CoreError::configuration(
                "tool_result_cap_bytes must be >= 1",
            ));
        }
        if self.tool_timeout_seconds == 0 {
            return Err(CoreError::configuration(
                "tool_timeout_seconds must be >= 1",
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

pub fn env_bool_default(key: &str, default: bool) -> bool {
    env_bool(key, default)
}
