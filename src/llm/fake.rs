// src/llm/fake.rs
// Scripted in-memory `LlmAdapter` fake for deterministic tests: a queue
// of canned `{text, tool_calls}` responses replayed in FIFO order, since
// tests drive specific scenarios rather than replaying recorded traffic.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CoreError;

use super::{CompletionRequest, CompletionResponse, LlmAdapter, ModelToolCall, TokenUsage};

/// One scripted reply. Use `ScriptedLlmAdapter::with_texts` for plain-text
/// fallbacks (routing) or `ScriptedLlmAdapter::new` with tool calls mixed
/// in for full expert-loop scenarios.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReply {
    pub text: String,
    pub tool_calls: Vec<ModelToolCall>,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![ModelToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            }],
        }
    }

    pub fn tool_calls(calls: Vec<ModelToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls,
        }
    }
}

pub struct ScriptedLlmAdapter {
    replies: Mutex<std::collections::VecDeque<ScriptedReply>>,
    /// Returned verbatim, in order, for `embed` calls; recycled once
    /// exhausted so tests don't have to script one embedding per call.
    embeddings: Mutex<Vec<Vec<f32>>>,
    recorded_requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmAdapter {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            embeddings: Mutex::new(vec![vec![0.1, 0.2, 0.3]]),
            recorded_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_texts(texts: Vec<String>) -> Self {
        Self::new(texts.into_iter().map(ScriptedReply::text).collect())
    }

    pub fn with_embeddings(mut self, embeddings: Vec<Vec<f32>>) -> Self {
        self.embeddings = Mutex::new(embeddings);
        self
    }

    /// Requests seen so far, for assertions about prompt construction.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.recorded_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmAdapter for ScriptedLlmAdapter {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CoreError> {
        self.recorded_requests.lock().unwrap().push(request);

        let mut replies = self.replies.lock().unwrap();
        let reply = replies.pop_front().ok_or_else(|| {
            CoreError::Internal("ScriptedLlmAdapter ran out of scripted replies".to_string())
        })?;

        Ok(CompletionResponse {
            text: reply.text,
            tool_calls: reply.tool_calls,
            usage: TokenUsage::default(),
        })
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
        let embeddings = self.embeddings.lock().unwrap();
        let idx = 0;
        embeddings
            .get(idx)
            .cloned()
            .ok_or_else(|| CoreError::Internal("ScriptedLlmAdapter has no embeddings configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_are_consumed_in_order() {
        let adapter = ScriptedLlmAdapter::with_texts(vec!["first".to_string(), "second".to_string()]);
        let req = CompletionRequest {
            system: "sys".to_string(),
            messages: vec![],
            tools: vec![],
            temperature: None,
            max_tokens: None,
        };
        let r1 = adapter.complete(req.clone()).await.unwrap();
        let r2 = adapter.complete(req).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
    }
}
