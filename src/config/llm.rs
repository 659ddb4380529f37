// src/config/llm.rs
// LLM adapter configuration: a single OpenAI-compatible chat-completions
// + embeddings endpoint, reached over HTTP with a bounded timeout and
// retry budget.

use serde::{Deserialize, Serialize};

use super::helpers::{env_or, env_parsed};
use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    /// Base backoff between retries; actual backoff grows `base * 2^attempt`.
    pub retry_backoff_ms: u64,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_or("LLM_BASE_URL", "http://localhost:11434/v1"),
            api_key: std::env::var("LLM_API_KEY").ok(),
            chat_model: env_or("LLM_CHAT_MODEL", "default"),
            embedding_model: env_or("LLM_EMBEDDING_MODEL", "default-embedding"),
            embedding_dimensions: env_parsed("LLM_EMBEDDING_DIMENSIONS", 768),
            request_timeout_seconds: env_parsed("LLM_REQUEST_TIMEOUT_SECONDS", 30),
            max_retries: env_parsed("LLM_MAX_RETRIES", 2),
            retry_backoff_ms: env_parsed("LLM_RETRY_BACKOFF_MS", 250),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.base_url.trim().is_empty() {
            return Err(CoreError::configuration("llm base_url must not be empty"));
        }
        if self.embedding_dimensions == 0 {
            return Err(CoreError::configuration(
                "llm embedding_dimensions must be >= 1",
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(CoreError::configuration(
                "llm request_timeout_seconds must be >= 1",
            ));
        }
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
