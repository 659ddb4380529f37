// src/session/pruning.rs
// Pruning policy from spec §4.1, with the stricter-of-two-bounds
// resolution for the last-N vs. token-budget interplay (spec §9 Open
// Question #1; decision recorded in DESIGN.md).

use super::types::{Message, Role};
use crate::config::session::SessionConfig;

/// Estimate token count from character count using the configured ratio.
/// The core has no model-specific tokenizer dependency (spec §4.1 is
/// explicit that this is an estimate).
fn estimate_tokens(messages: &[Message], chars_per_token: f64) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    ((chars as f64) / chars_per_token.max(0.001)).ceil() as usize
}

/// Whether trimming the oldest message at `idx` would separate a `tool`
/// message from the `assistant` tool-call message it answers, or vice
/// versa (spec §4.1 rule 3, tested by property 4 in spec §8).
///
/// A `Tool` message is only a hard boundary when its own `assistant`
/// tool-call message is *not* the message immediately before it -- in that
/// adjacent case the pair is meant to be dropped together (see the
/// leading-pair branch in `prune_messages`), not treated as unremovable.
fn is_removable_pair_boundary(messages: &[Message], idx: usize) -> bool {
    let msg = &messages[idx];
    match msg.role {
        Role::Tool => idx > 0 && is_matching_tool_call(&messages[idx - 1], msg),
        Role::Assistant if msg.is_tool_call_bearing() => {
            let ids: std::collections::HashSet<&str> =
                msg.tool_calls.iter().map(|t| t.id.as_str()).collect();
            !messages.iter().any(|m| {
                m.role == Role::Tool
                    && m.tool_call_id
                        .as_deref()
                        .is_some_and(|id| ids.contains(id))
            })
        }
        _ => true,
    }
}

/// Whether `tool_msg` is the `tool`-role answer to `assistant_msg`'s
/// tool call (i.e. they form an adjacent, droppable-together pair).
fn is_matching_tool_call(assistant_msg: &Message, tool_msg: &Message) -> bool {
    assistant_msg.role == Role::Assistant
        && tool_msg
            .tool_call_id
            .as_deref()
            .is_some_and(|id| assistant_msg.tool_calls.iter().any(|t| t.id == id))
}

/// Apply the configured retention window, then (if still over budget) trim
/// further in request/response pairs. Never splits a tool/assistant
/// tool_call pair. System messages are always retained.
pub fn prune_messages(messages: Vec<Message>, config: &SessionConfig) -> Vec<Message> {
    let (system, mut rest): (Vec<Message>, Vec<Message>) = messages
        .into_iter()
        .partition(|m| matches!(m.role, Role::System));

    if rest.len() > config.prune_last_n_messages {
        let cut = rest.len() - config.prune_last_n_messages;
        let mut trimmed_from = 0;
        while trimmed_from < cut {
            if is_removable_pair_boundary(&rest, trimmed_from) {
                trimmed_from += 1;
            } else {
                // Keep the pair together; stop trimming at this index even
                // though it leaves the window slightly larger than N.
                break;
            }
        }
        rest.drain(0..trimmed_from);
    }

    while estimate_tokens(&rest, config.chars_per_token_estimate) > config.prune_token_budget
        && rest.len() > 1
    {
        if is_removable_pair_boundary(&rest, 0) {
            rest.remove(0);
        } else if rest.len() > 1 && is_removable_pair_boundary(&rest, 1) {
            // Drop the paired assistant+tool call together (response then
            // request) to make forward progress without splitting them.
            let _ = rest.remove(0);
            if !rest.is_empty() {
                rest.remove(0);
            }
        } else {
            break;
        }
    }

    let mut out = system;
    out.extend(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::ToolCallRequest;

    fn cfg(last_n: usize, budget: usize) -> SessionConfig {
        SessionConfig {
            prune_last_n_messages: last_n,
            prune_token_budget: budget,
            chars_per_token_estimate: 4.0,
            session_ttl_seconds: 0,
        }
    }

    #[test]
    fn retains_system_and_window() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..30 {
            messages.push(Message::user(format!("msg {i}")));
        }
        let pruned = prune_messages(messages, &cfg(5, 100_000));
        assert!(matches!(pruned[0].role, Role::System));
        assert_eq!(pruned.len(), 6);
    }

    #[test]
    fn never_splits_tool_call_pair() {
        let mut messages = Vec::new();
        for i in 0..10 {
            messages.push(Message::user(format!("u{i}")));
        }
        let call = ToolCallRequest {
            id: "call-1".to_string(),
            name: "create_task".to_string(),
            arguments: serde_json::json!({}),
        };
        messages.push(Message::assistant_with_tool_calls(vec![call]));
        messages.push(Message::tool_result("call-1", "create_task", "{}"));

        let pruned = prune_messages(messages, &cfg(1, 100_000));
        let has_tool = pruned.iter().any(|m| m.role == Role::Tool);
        let has_call = pruned.iter().any(|m| m.is_tool_call_bearing());
        assert_eq!(has_tool, has_call);
    }

    #[test]
    fn token_budget_drops_leading_tool_call_pair_together() {
        let call = ToolCallRequest {
            id: "call-1".to_string(),
            name: "create_task".to_string(),
            arguments: serde_json::json!({}),
        };
        let messages = vec![
            Message::assistant_with_tool_calls(vec![call]),
            Message::tool_result("call-1", "create_task", "{}"),
            Message::user("a short follow-up message"),
        ];

        // `prune_last_n_messages` is large enough that the window trim
        // never runs; a tight token budget forces the second loop to make
        // progress by dropping the leading assistant/tool pair together.
        let pruned = prune_messages(messages, &cfg(100, 1));

        assert!(!pruned.iter().any(|m| m.role == Role::Tool));
        assert!(!pruned.iter().any(|m| m.is_tool_call_bearing()));
    }
}
