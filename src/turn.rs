// src/turn.rs
// Wires Session Loader -> Router -> Expert -> Continuation Check ->
// Session Saver (spec §2 diagram) into the one entrypoint function the
// HTTP layer and tests call. Grounded on the teacher's capability-wiring
// pattern (examples/ConaryLabs-Mira/backend/src/state.rs `AppState`),
// generalized down from Mira's ~30-field state to the handful of
// capabilities this core actually needs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::experts::ExpertRegistry;
use crate::observability::TurnLog;
use crate::prompt::PromptRegistry;
use crate::router::{RouteDecision, Router};
use crate::runtime::{ExpertRuntime, HandoffController, ToolCallLog};
use crate::session::{Message, Session, SessionLocks, SessionSummary, SharedSessionStore};
use crate::tools::ToolContext;

/// Turn entrypoint input (spec §6.1).
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    pub user_id: String,
    pub session_id: String,
    pub workspace: String,
    /// Accepted per the wire contract but streaming transport is out of
    /// this core's scope (spec §1); a caller that sets it gets the same
    /// complete reply, just flagged as having asked for a stream.
    pub stream: bool,
}

/// Turn entrypoint output (spec §6.1).
#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnResponse {
    pub reply: String,
    pub session_id: String,
    pub expert: String,
    pub handoff: Option<crate::session::Handoff>,
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallLog>,
}

/// Everything the turn pipeline needs, built once at startup and shared
/// across every turn (spec §5: "no core-level global mutable state except
/// the tool and prompt registries... and optional counters for
/// telemetry" -- everything else here is read-only capabilities plus the
/// per-session lock table).
pub struct CorePipeline {
    pub config: Arc<CoreConfig>,
    pub session_store: SharedSessionStore,
    pub session_locks: Arc<SessionLocks>,
    pub router: Router,
    pub experts: ExpertRegistry,
    pub runtime: ExpertRuntime,
    pub handoff: HandoffController,
    pub tool_ctx: ToolContext,
    /// Same registry the expert runtime renders prompts from. Exposed here
    /// (rather than only inside `ExpertRuntime`) so the admin reload route
    /// (spec §4.7, §6.4) reloads the one the live server is actually
    /// serving from, instead of a throwaway copy.
    pub prompts: Arc<PromptRegistry>,
}

impl CorePipeline {
    /// Runs one turn end to end (spec §2, §4.1-§4.4, §5, §6.1).
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse, CoreError> {
        validate_request(&request)?;

        let guard = self
            .session_locks
            .acquire(
                &request.session_id,
                self.config.runtime.busy_session_policy,
                Duration::from_secs(self.config.runtime.busy_wait_cap_seconds),
            )
            .await?;

        let load_span = crate::observability::session_load_span(&request.session_id);
        let mut session = {
            let _enter = load_span.enter();
            self.session_store
                .load(&request.session_id, &request.user_id, &request.workspace)
                .await?
        };

        session.begin_turn();
        session.messages.push(Message::user(request.message.clone()));

        let started = Instant::now();
        let turn_deadline = Duration::from_secs(self.config.runtime.turn_deadline_seconds);

        let result = tokio::time::timeout(turn_deadline, self.drive_experts(&mut session, &request)).await;

        let (expert_name, decision, outcome, handoff_count) = match result {
            Ok(inner) => inner?,
            Err(_elapsed) => {
                warn!(session_id = %request.session_id, "turn deadline exceeded, truncating gracefully");
                let fallback_expert = session
                    .current_expert
                    .clone()
                    .unwrap_or_else(|| self.config.runtime.default_expert.clone());
                let reply = "This is taking longer than expected, so I'm stopping here with what I have so far.".to_string();
                session.messages.push(Message::assistant(reply.clone()));
                let outcome = crate::runtime::IterationOutcome {
                    reply,
                    iterations: session.iteration_count,
                    tool_calls: Vec::new(),
                    truncated: true,
                };
                (fallback_expert, RouteDecision::Sticky, outcome, 0)
            }
        };

        session.messages = crate::session::pruning::prune_messages(
            std::mem::take(&mut session.messages),
            &self.config.session,
        );
        session.updated_at = chrono::Utc::now();

        let handoff = session.handoff.clone();

        let save_span = crate::observability::session_save_span(&request.session_id);
        {
            let _enter = save_span.enter();
            if let Err(err) = self.session_store.save(&session).await {
                // spec §4.1: "a save failure is logged and the reply is
                // still returned" -- do not fail the turn over it.
                warn!(session_id = %request.session_id, error = %err, "session save failed");
            }
        }

        drop(guard);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        TurnLog::new(
            &request.session_id,
            &expert_name,
            &decision,
            outcome.iterations,
            handoff_count,
            &outcome.tool_calls,
            elapsed_ms,
        )
        .log(self.config.observability.log_turn_summaries);

        Ok(TurnResponse {
            reply: outcome.reply,
            session_id: request.session_id,
            expert: expert_name,
            handoff,
            iterations: outcome.iterations,
            tool_calls: outcome.tool_calls,
        })
    }

    /// Router -> Expert -> Handoff loop, bounded to
    /// `handoff_max_per_turn` re-entries (spec §4.2-§4.4). Split out of
    /// `run_turn` so it can be wrapped in a single `tokio::time::timeout`
    /// without the deadline branch duplicating the routing logic.
    async fn drive_experts(
        &self,
        session: &mut Session,
        request: &TurnRequest,
    ) -> Result<(String, RouteDecision, crate::runtime::IterationOutcome, u32), CoreError> {
        let route_span = crate::observability::route_span(&request.session_id);
        let (mut expert_name, decision) = {
            let _enter = route_span.enter();
            self.router.route(session, &request.message).await?
        };

        let mut handoff_banner: Option<String> = None;
        let mut handoff_count = 0u32;

        loop {
            let expert_span = crate::observability::expert_iteration_span(&request.session_id, &expert_name);
            let outcome = {
                let _enter = expert_span.enter();
                self.runtime
                    .run(session, &expert_name, &self.tool_ctx, handoff_banner.as_deref())
                    .await?
            };

            if outcome.truncated || handoff_count >= self.config.runtime.handoff_max_per_turn {
                return Ok((expert_name, decision, outcome, handoff_count));
            }

            match self.handoff.detect(&expert_name, &request.message) {
                Some((target, term)) => {
                    info!(
                        session_id = %request.session_id,
                        from = %expert_name,
                        to = %target,
                        term = %term,
                        "handoff triggered"
                    );
                    self.handoff.apply(session, &expert_name, &target, &term);
                    handoff_banner = Some(format!(
                        "A handoff just occurred from the {expert_name} expert to you (the {target} expert), \
                         triggered by the term \"{term}\". Acknowledge the prior context briefly, then continue \
                         helping with the new request."
                    ));
                    expert_name = target;
                    handoff_count += 1;
                }
                None => return Ok((expert_name, decision, outcome, handoff_count)),
            }
        }
    }

    /// Clears all persisted state for a session (spec §6.3 `clear`).
    /// Idempotent.
    pub async fn clear_session(&self, session_id: &str) -> Result<(), CoreError> {
        self.session_store.clear(session_id).await
    }

    /// Metadata without full content (spec §6.3 `describe`).
    pub async fn describe_session(&self, session_id: &str) -> Result<Option<SessionSummary>, CoreError> {
        self.session_store.describe(session_id).await
    }
}

fn validate_request(request: &TurnRequest) -> Result<(), CoreError> {
    let len = request.message.chars().count();
    if len == 0 || len > 4000 {
        return Err(CoreError::invalid_argument(
            "message must be between 1 and 4000 characters",
        ));
    }
    if request.user_id.trim().is_empty() {
        return Err(CoreError::invalid_argument("user_id must not be empty"));
    }
    if request.session_id.trim().is_empty() {
        return Err(CoreError::invalid_argument("session_id must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::experts::default_registry;
    use crate::llm::fake::{ScriptedLlmAdapter, ScriptedReply};
    use crate::llm::LlmAdapter;
    use crate::prompt::PromptRegistry;
    use crate::session::InMemorySessionStore;
    use crate::tools::vector::InMemoryVectorStore;
    use crate::tools::{builder, SqliteStructuredStore};
    use serde_json::json;
    use sqlx::SqlitePool;

    fn write_all_expert_prompts(dir: &std::path::Path) {
        for name in ["expert_food", "expert_task", "expert_event", "expert_reminder"] {
            std::fs::write(dir.join(format!("{name}.md")), format!("You are the {name} expert.")).unwrap();
        }
    }

    async fn pipeline_with(llm: Arc<dyn LlmAdapter>) -> (CorePipeline, std::sync::Arc<tempfile::TempDir>) {
        let tmp = Arc::new(tempfile::tempdir().unwrap());
        write_all_expert_prompts(tmp.path());
        let prompt_config = crate::config::prompt::PromptConfig {
            templates_dir: tmp.path().to_string_lossy().to_string(),
        };
        let prompts = Arc::new(
            PromptRegistry::load(
                &prompt_config,
                &["expert_food", "expert_task", "expert_event", "expert_reminder"],
            )
            .unwrap(),
        );

        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteStructuredStore::new(pool);
        store.ensure_schema().await.unwrap();

        let config = Arc::new(CoreConfig::default());
        let vectors = InMemoryVectorStore::shared(config.tools.vector_dimensions.clone());
        let tool_ctx = ToolContext {
            structured: Arc::new(store),
            vectors,
            llm: llm.clone(),
            config: config.clone(),
        };

        let experts = default_registry();
        let runtime = ExpertRuntime::new(
            experts.clone(),
            Arc::new(builder::default_registry()),
            llm.clone(),
            prompts.clone(),
            config.runtime.clone(),
        );
        let router = Router::new(experts.clone(), llm.clone(), &config.runtime);
        let handoff = HandoffController::new(experts.clone());

        let pipeline = CorePipeline {
            config,
            session_store: Arc::new(InMemorySessionStore::new()),
            session_locks: Arc::new(SessionLocks::new()),
            router,
            experts,
            runtime,
            handoff,
            tool_ctx,
            prompts,
        };

        (pipeline, tmp)
    }

    #[tokio::test]
    async fn s1_first_turn_logs_food_entry_and_confirms() {
        let llm = ScriptedLlmAdapter::new(vec![
            ScriptedReply::tool_call(
                "call-1",
                "create_food_entry",
                json!({"name": "salmon sashimi", "location": "home", "preference": "favorite"}),
            ),
            ScriptedReply::text("Logged salmon sashimi at home as a favorite!"),
        ]);
        let (pipeline, _tmp) = pipeline_with(Arc::new(llm)).await;

        let response = pipeline
            .run_turn(TurnRequest {
                message: "log that I ate salmon sashimi at home and loved it".to_string(),
                user_id: "u1".to_string(),
                session_id: "S1".to_string(),
                workspace: "default".to_string(),
                stream: false,
            })
            .await
            .unwrap();

        assert_eq!(response.expert, "food");
        assert_eq!(response.iterations, 2);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "create_food_entry");
        assert!(response.handoff.is_none());
        assert!(response.reply.contains("salmon"));
    }

    #[tokio::test]
    async fn s3_handoff_on_domain_shift() {
        let llm = ScriptedLlmAdapter::new(vec![
            // food expert turn (no tool call needed for this scenario)
            ScriptedReply::text("Got it, still thinking about that salmon."),
            // task expert re-entry after handoff
            ScriptedReply::tool_call(
                "call-1",
                "create_task",
                json!({"title": "buy more salmon", "due_date": "2026-08-04T00:00:00Z"}),
            ),
            ScriptedReply::text("Added a task to buy more salmon, and noted the food context."),
        ]);
        let (pipeline, _tmp) = pipeline_with(Arc::new(llm)).await;

        let mut session = crate::session::Session::new("S3", "u1", "default");
        session.current_expert = Some("food".to_string());
        pipeline.session_store.save(&session).await.unwrap();

        let response = pipeline
            .run_turn(TurnRequest {
                message: "also add a task to buy more salmon next week".to_string(),
                user_id: "u1".to_string(),
                session_id: "S3".to_string(),
                workspace: "default".to_string(),
                stream: false,
            })
            .await
            .unwrap();

        let handoff = response.handoff.expect("expected a handoff this turn");
        assert_eq!(handoff.source, "food");
        assert_eq!(handoff.target, "task");
        assert_eq!(response.expert, "task");
        assert!(response.reply.contains("salmon"));
    }

    #[tokio::test]
    async fn clear_then_describe_is_none() {
        let llm: Arc<dyn LlmAdapter> = Arc::new(ScriptedLlmAdapter::with_texts(vec![]));
        let (pipeline, _tmp) = pipeline_with(llm).await;

        let session = crate::session::Session::new("S9", "u1", "default");
        pipeline.session_store.save(&session).await.unwrap();

        pipeline.clear_session("S9").await.unwrap();
        assert!(pipeline.describe_session("S9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_message_is_invalid_argument() {
        let llm: Arc<dyn LlmAdapter> = Arc::new(ScriptedLlmAdapter::with_texts(vec![]));
        let (pipeline, _tmp) = pipeline_with(llm).await;

        let err = pipeline
            .run_turn(TurnRequest {
                message: String::new(),
                user_id: "u1".to_string(),
                session_id: "S10".to_string(),
                workspace: "default".to_string(),
                stream: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
