// src/llm/mod.rs
// LLM adapter: a single narrow trait used by the router, the expert
// runtime, and the tool layer's embedding calls, so there is exactly one
// place that owns HTTP timeout/retry policy.

pub mod fake;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::session::Message;

pub use http::HttpLlmAdapter;

/// One callable tool schema handed to the model for a given call (built
/// from `ToolDescriptor::parameter_schema` by the tool registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// One tool call the model asked to make, independent of the session's own
/// `ToolCallRequest` type so the adapter boundary doesn't leak session
/// internals into the wire format (and vice versa).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub tool_calls: Vec<ModelToolCall>,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Uniform call surface over a local model server. A trait so tests can
/// substitute a scripted fake (`fake::ScriptedLlmAdapter`) without a live
/// model server.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CoreError>;

    /// Embeds `text` into a fixed-dimensionality vector for the configured
    /// embedding model. Shares this trait's timeout/retry policy rather
    /// than a parallel implementation.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
}
