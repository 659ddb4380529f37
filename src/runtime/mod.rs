// src/runtime/mod.rs
// Expert runtime: the bounded tool-calling loop for one selected expert
// -- prompt assembly, LLM call, per-tool-call validate -> dispatch ->
// append, iteration cap, forced termination message.

pub mod handoff;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, warn};

use crate::config::runtime::RuntimeConfig;
use crate::error::CoreError;
use crate::experts::ExpertRegistry;
use crate::llm::{CompletionRequest, LlmAdapter};
use crate::prompt::PromptRegistry;
use crate::session::{Message, Session, ToolCallRequest};
use crate::tools::{ToolContext, ToolRegistry};

pub use handoff::HandoffController;

/// One entry in the `tool_calls` observability array of the turn response
/// (spec §6.1).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolCallLog {
    pub name: String,
    pub duration_ms: u64,
    pub ok: bool,
}

/// Result of running the expert loop for one expert, for one or more
/// re-entries within a turn (spec §4.3, §4.4).
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub reply: String,
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallLog>,
    pub truncated: bool,
}

/// Drives the per-expert tool-calling loop (spec §4.3). Holds only
/// read-only-after-startup capabilities; all mutable state lives on the
/// `Session` passed to `run`.
pub struct ExpertRuntime {
    experts: ExpertRegistry,
    tools: Arc<ToolRegistry>,
    llm: Arc<dyn LlmAdapter>,
    prompts: Arc<PromptRegistry>,
    config: RuntimeConfig,
}

impl ExpertRuntime {
    pub fn new(
        experts: ExpertRegistry,
        tools: Arc<ToolRegistry>,
        llm: Arc<dyn LlmAdapter>,
        prompts: Arc<PromptRegistry>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            experts,
            tools,
            llm,
            prompts,
            config,
        }
    }

    /// Runs the expert loop for `expert_name` until a final assistant
    /// message is produced or the iteration cap forces termination (spec
    /// §4.3). `handoff_banner`, when present, is prepended to the system
    /// prompt for the duration of this entry (spec §4.4: "re-enter the
    /// expert runtime for the same turn, with the handoff banner
    /// prepended to the prompt").
    pub async fn run(
        &self,
        session: &mut Session,
        expert_name: &str,
        tool_ctx: &ToolContext,
        handoff_banner: Option<&str>,
    ) -> Result<IterationOutcome, CoreError> {
        let expert = self.experts.require(expert_name)?;
        let system_base = self.prompts.render(&expert.system_prompt, &HashMap::new())?;
        let tool_timeout = Duration::from_secs(self.config.tool_timeout_seconds);

        let mut tool_call_logs = Vec::new();

        loop {
            if session.iteration_count >= self.config.max_iterations_per_turn {
                let summary = summarize_recent_tool_results(session);
                let reply = format!(
                    "I've hit the step limit for this request; here's what I have so far:\n{summary}"
                );
                session.messages.push(Message::assistant(reply.clone()));
                return Ok(IterationOutcome {
                    reply,
                    iterations: session.iteration_count,
                    tool_calls: tool_call_logs,
                    truncated: true,
                });
            }

            let schemas = self.tools.schemas_for(&expert.allowed_tools);
            let system = self.build_system_prompt(&system_base, session, expert_name, handoff_banner);

            let request = CompletionRequest {
                system,
                messages: session.messages.clone(),
                tools: schemas,
                temperature: Some(0.2),
                max_tokens: None,
            };

            let response = self.llm.complete(request).await?;
            session.iteration_count += 1;

            if response.is_final() {
                session.messages.push(Message::assistant(response.text.clone()));
                return Ok(IterationOutcome {
                    reply: response.text,
                    iterations: session.iteration_count,
                    tool_calls: tool_call_logs,
                    truncated: false,
                });
            }

            let tool_call_requests: Vec<ToolCallRequest> = response
                .tool_calls
                .iter()
                .map(|tc| ToolCallRequest {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .collect();
            session
                .messages
                .push(Message::assistant_with_tool_calls(tool_call_requests));

            // Sequential dispatch, in the order the model emitted them
            // (spec §4.3: "Multiple write-class tools in the same
            // iteration are executed sequentially... to preserve causal
            // ordering of side effects").
            for call in &response.tool_calls {
                let started = Instant::now();
                let outcome = self
                    .tools
                    .dispatch(tool_ctx, &call.name, call.arguments.clone(), tool_timeout)
                    .await;
                let duration_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(value) => {
                        let serialized = truncate_for_model(&value, self.config.tool_result_cap_bytes);
                        session
                            .messages
                            .push(Message::tool_result(call.id.clone(), call.name.clone(), serialized));
                        tool_call_logs.push(ToolCallLog {
                            name: call.name.clone(),
                            duration_ms,
                            ok: true,
                        });
                        info!(tool = %call.name, duration_ms, "tool call completed");
                    }
                    Err(err) if err.is_fatal_to_turn() => {
                        warn!(tool = %call.name, error = %err, "tool call raised a fatal error");
                        return Err(err);
                    }
                    Err(err) => {
                        let payload = serde_json::to_string(&err.to_payload())
                            .unwrap_or_else(|_| "{\"kind\":\"internal\"}".to_string());
                        session
                            .messages
                            .push(Message::tool_result(call.id.clone(), call.name.clone(), payload));
                        tool_call_logs.push(ToolCallLog {
                            name: call.name.clone(),
                            duration_ms,
                            ok: false,
                        });
                    }
                }
            }
        }
    }

    fn build_system_prompt(
        &self,
        system_base: &str,
        session: &Session,
        expert_name: &str,
        handoff_banner: Option<&str>,
    ) -> String {
        let mut system = system_base.to_string();

        if let Some(banner) = handoff_banner {
            system = format!("{banner}\n\n{system}");
        }

        if let Some(ctx) = session.domain_contexts.get(expert_name) {
            if ctx.is_object() && !ctx.as_object().map(|m| m.is_empty()).unwrap_or(true) {
                system = format!("{system}\n\nYour private notes for this session: {ctx}");
            }
        }

        system
    }
}

/// Truncates a tool result's JSON serialization to `cap_bytes` (spec
/// §4.3 step 5: "truncated to configured cap, default 8 KB"). Truncation
/// happens on the serialized string so the model always receives valid
/// UTF-8, at the cost of possibly-invalid JSON past the cut -- acceptable
/// since a truncated-marker suffix makes that obvious to the model.
fn truncate_for_model(value: &Value, cap_bytes: usize) -> String {
    let serialized = value.to_string();
    if serialized.len() <= cap_bytes {
        return serialized;
    }

    let mut cut = cap_bytes;
    while cut > 0 && !serialized.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...<truncated>", &serialized[..cut])
}

/// Best-effort summary of the last few tool results for the forced
/// termination message (spec §4.3 step 6: "summarizing the last tool
/// results").
fn summarize_recent_tool_results(session: &Session) -> String {
    let recent: Vec<String> = session
        .messages
        .iter()
        .rev()
        .filter(|m| m.role == crate::session::Role::Tool)
        .take(3)
        .map(|m| {
            let name = m.name.as_deref().unwrap_or("tool");
            let snippet: String = m.content.chars().take(200).collect();
            format!("- {name}: {snippet}")
        })
        .collect();

    if recent.is_empty() {
        "(no tool results were produced yet)".to_string()
    } else {
        let mut ordered = recent;
        ordered.reverse();
        ordered.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::experts::default_registry;
    use crate::llm::fake::{ScriptedLlmAdapter, ScriptedReply};
    use crate::tools::vector::InMemoryVectorStore;
    use crate::tools::{builder, SqliteStructuredStore};
    use serde_json::json;
    use sqlx::SqlitePool;

    async fn test_tool_ctx() -> (ToolContext, Arc<dyn LlmAdapter>) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteStructuredStore::new(pool);
        store.ensure_schema().await.unwrap();
        let llm: Arc<dyn LlmAdapter> = Arc::new(ScriptedLlmAdapter::new(Vec::new()));
        let config = Arc::new(CoreConfig::default());
        let vectors = InMemoryVectorStore::shared(config.tools.vector_dimensions.clone());
        (
            ToolContext {
                structured: Arc::new(store),
                vectors,
                llm: llm.clone(),
                config,
            },
            llm,
        )
    }

    fn prompts_with(expert: &str) -> PromptRegistry {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(format!("{expert}.md")),
            format!("You are the {expert} expert."),
        )
        .unwrap();
        let config = crate::config::prompt::PromptConfig {
            templates_dir: tmp.path().to_string_lossy().to_string(),
        };
        // leak the tempdir so the registry's files stay alive for the
        // duration of the test
        std::mem::forget(tmp);
        PromptRegistry::load(&config, &[expert]).unwrap()
    }

    #[tokio::test]
    async fn final_text_ends_loop_after_one_iteration() {
        let (tool_ctx, _llm_handle) = test_tool_ctx().await;
        let llm: Arc<dyn LlmAdapter> =
            Arc::new(ScriptedLlmAdapter::with_texts(vec!["All set.".to_string()]));
        let runtime = ExpertRuntime::new(
            default_registry(),
            Arc::new(builder::default_registry()),
            llm,
            Arc::new(prompts_with("expert_task")),
            RuntimeConfig::default(),
        );

        let mut session = Session::new("s1", "u1", "default");
        session.begin_turn();
        session.messages.push(Message::user("add a task"));

        let outcome = runtime.run(&mut session, "task", &tool_ctx, None).await.unwrap();
        assert_eq!(outcome.reply, "All set.");
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.tool_calls.is_empty());
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn tool_call_then_final_text_is_two_iterations() {
        let (tool_ctx, _llm_handle) = test_tool_ctx().await;
        let llm = ScriptedLlmAdapter::new(vec![
            ScriptedReply::tool_call(
                "call-1",
                "create_food_entry",
                json!({"name": "salmon sashimi", "location": "home", "preference": "favorite"}),
            ),
            ScriptedReply::text("Logged it, enjoy!"),
        ]);
        let llm: Arc<dyn LlmAdapter> = Arc::new(llm);
        let runtime = ExpertRuntime::new(
            default_registry(),
            Arc::new(builder::default_registry()),
            llm,
            Arc::new(prompts_with("expert_food")),
            RuntimeConfig::default(),
        );

        let mut session = Session::new("s2", "u1", "default");
        session.begin_turn();
        session
            .messages
            .push(Message::user("log that I ate salmon sashimi at home and loved it"));

        let outcome = runtime.run(&mut session, "food", &tool_ctx, None).await.unwrap();
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].ok);
        assert_eq!(outcome.reply, "Logged it, enjoy!");

        let has_tool_msg = session.messages.iter().any(|m| m.role == crate::session::Role::Tool);
        assert!(has_tool_msg);
    }

    #[tokio::test]
    async fn iteration_cap_forces_termination() {
        let (tool_ctx, _llm_handle) = test_tool_ctx().await;
        let llm = ScriptedLlmAdapter::new(vec![
            ScriptedReply::tool_call("c1", "list_tasks", json!({})),
            ScriptedReply::tool_call("c2", "list_tasks", json!({})),
        ]);
        let llm: Arc<dyn LlmAdapter> = Arc::new(llm);

        let mut config = RuntimeConfig::default();
        config.max_iterations_per_turn = 2;

        let runtime = ExpertRuntime::new(
            default_registry(),
            Arc::new(builder::default_registry()),
            llm,
            Arc::new(prompts_with("expert_task")),
            config,
        );

        let mut session = Session::new("s3", "u1", "default");
        session.begin_turn();
        session.messages.push(Message::user("keep listing my tasks"));

        let outcome = runtime.run(&mut session, "task", &tool_ctx, None).await.unwrap();
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.truncated);
        assert!(outcome.reply.contains("step limit"));
    }

    #[test]
    fn truncates_long_tool_results() {
        let value = json!({"data": "x".repeat(100)});
        let truncated = truncate_for_model(&value, 20);
        assert!(truncated.len() <= 20 + "...<truncated>".len());
        assert!(truncated.ends_with("...<truncated>"));
    }
}
