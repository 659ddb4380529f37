// src/llm/http.rs
// Production `LlmAdapter`: an OpenAI-compatible chat-completions +
// embeddings client over HTTP to a configurable local model server. The
// embedding service and model server themselves are external; this is
// just the client talking to them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::llm::LlmConfig;
use crate::error::CoreError;
use crate::session::{Message, Role};

use super::{CompletionRequest, CompletionResponse, LlmAdapter, ModelToolCall, TokenUsage};

pub struct HttpLlmAdapter {
    client: Client,
    config: LlmConfig,
}

impl HttpLlmAdapter {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.retry_backoff_ms * 2u64.pow(attempt))
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    fn to_wire_message(message: &Message) -> Value {
        let mut obj = json!({
            "role": Self::role_str(message.role),
            "content": message.content,
        });
        if let Some(map) = obj.as_object_mut() {
            if !message.tool_calls.is_empty() {
                map.insert(
                    "tool_calls".to_string(),
                    json!(message
                        .tool_calls
                        .iter()
                        .map(|tc| json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        }))
                        .collect::<Vec<_>>()),
                );
            }
            if let Some(id) = &message.tool_call_id {
                map.insert("tool_call_id".to_string(), json!(id));
            }
            if let Some(name) = &message.name {
                map.insert("name".to_string(), json!(name));
            }
        }
        obj
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = vec![json!({"role": "system", "content": request.system})];
        messages.extend(request.messages.iter().map(Self::to_wire_message));

        let mut body = json!({
            "model": self.config.chat_model,
            "messages": messages,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(temp) = request.temperature {
                obj.insert("temperature".to_string(), json!(temp));
            }
            if let Some(max_tokens) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(max_tokens));
            }
            if !request.tools.is_empty() {
                obj.insert(
                    "tools".to_string(),
                    json!(request
                        .tools
                        .iter()
                        .map(|t| json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        }))
                        .collect::<Vec<_>>()),
                );
            }
        }

        body
    }

    fn parse_response(raw: &Value) -> Result<CompletionResponse, CoreError> {
        let choice = raw["choices"].get(0).ok_or_else(|| {
            CoreError::Internal("llm response had no choices".to_string())
        })?;
        let message = &choice["message"];
        let text = message["content"].as_str().unwrap_or_default().to_string();

        let tool_calls = message["tool_calls"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                let id = tc["id"].as_str()?.to_string();
                let name = tc["function"]["name"].as_str()?.to_string();
                let arguments_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                let arguments: Value = serde_json::from_str(arguments_str).unwrap_or(json!({}));
                Some(ModelToolCall { id, name, arguments })
            })
            .collect();

        let usage = TokenUsage {
            prompt_tokens: raw["usage"]["prompt_tokens"].as_u64().map(|v| v as u32),
            completion_tokens: raw["usage"]["completion_tokens"].as_u64().map(|v| v as u32),
        };

        Ok(CompletionResponse {
            text,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl LlmAdapter for HttpLlmAdapter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CoreError> {
        let body = self.build_body(&request);
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let timeout = Duration::from_secs(self.config.request_timeout_seconds);

        let mut last_err: Option<CoreError> = None;

        for attempt in 0..=self.config.max_retries {
            let send = self
                .auth(self.client.post(&url))
                .json(&body)
                .timeout(timeout)
                .send();

            let started = std::time::Instant::now();
            match send.await {
                Ok(response) if response.status().is_success() => {
                    let raw: Value = response.json().await?;
                    let parsed = Self::parse_response(&raw)?;
                    info!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        tool_call_count = parsed.tool_calls.len(),
                        "llm call completed"
                    );
                    return Ok(parsed);
                }
                // Model-reported errors (4xx) are not retried.
                Ok(response) if response.status().is_client_error() => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(CoreError::InvalidArgument(format!(
                        "llm rejected request ({status}): {text}"
                    )));
                }
                Ok(response) => {
                    let status = response.status();
                    last_err = Some(CoreError::Transient(format!("llm server error: {status}")));
                }
                Err(e) => {
                    let err: CoreError = e.into();
                    warn!(attempt, error = %err, "llm call failed");
                    last_err = Some(err);
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::Internal("llm call failed with no error".to_string())))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.embedding_model,
            "input": text,
        });
        let timeout = Duration::from_secs(self.config.request_timeout_seconds);

        let mut last_err: Option<CoreError> = None;
        for attempt in 0..=self.config.max_retries {
            let send = self
                .auth(self.client.post(&url))
                .json(&body)
                .timeout(timeout)
                .send();

            match send.await {
                Ok(response) if response.status().is_success() => {
                    let raw: Value = response.json().await?;
                    let embedding = raw["data"][0]["embedding"]
                        .as_array()
                        .ok_or_else(|| CoreError::Internal("no embedding in response".to_string()))?
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect::<Vec<f32>>();
                    return Ok(embedding);
                }
                Ok(response) if response.status().is_client_error() => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return Err(CoreError::InvalidArgument(format!(
                        "embedding request rejected ({status}): {text}"
                    )));
                }
                Ok(response) => {
                    last_err = Some(CoreError::Transient(format!(
                        "embedding server error: {}",
                        response.status()
                    )));
                }
                Err(e) => last_err = Some(e.into()),
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::Internal("embed call failed with no error".to_string())))
    }
}
