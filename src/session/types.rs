// src/session/types.rs
// Session state shape (spec §3). Grounded on the teacher's session type
// definitions (examples/ConaryLabs-Mira/backend/src/session/types.rs) and
// the provider-agnostic message/tool-call shape from
// examples/sblanchard-SerialAgent/crates/domain/src/tool.rs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A single tool call emitted by the model within one assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Present on `Tool`-role messages: the `ToolCallRequest::id` this
    /// message answers (spec §3 invariant 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Present on `Tool`-role messages: the tool name, carried alongside
    /// `tool_call_id` so pruning and logging don't need a join back to the
    /// originating assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_with_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls,
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_tool_call_bearing(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// A single-turn handoff record (spec §3, §4.4). Never persisted beyond the
/// turn that produced it — the session carries at most one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub source: String,
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub workspace: String,
    pub messages: Vec<Message>,
    pub current_expert: Option<String>,
    /// Expert name -> small JSON scratchpad, private to that expert.
    pub domain_contexts: HashMap<String, serde_json::Value>,
    pub handoff: Option<Handoff>,
    pub iteration_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, workspace: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            workspace: workspace.into(),
            messages: Vec::new(),
            current_expert: None,
            domain_contexts: HashMap::new(),
            handoff: None,
            iteration_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Scratchpad for the given expert, inserting an empty object on first
    /// access so callers can always serde-deserialize it into their own
    /// context type.
    pub fn domain_context_mut(&mut self, expert: &str) -> &mut serde_json::Value {
        self.domain_contexts
            .entry(expert.to_string())
            .or_insert_with(|| serde_json::json!({}))
    }

    /// Reset the per-turn counters; called by the loader at the start of a
    /// turn (spec §3: `iteration_count` resets per turn).
    pub fn begin_turn(&mut self) {
        self.iteration_count = 0;
        self.handoff = None;
    }
}

/// Lightweight metadata returned by `describe` (spec §6.3) without exposing
/// full message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub current_expert: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.session_id.clone(),
            message_count: s.messages.len(),
            current_expert: s.current_expert.clone(),
            updated_at: s.updated_at,
        }
    }
}
