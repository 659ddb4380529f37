// src/lib.rs
// Crate root: module tree plus the startup wiring that turns a
// `CoreConfig` into a running `CorePipeline`.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod experts;
pub mod llm;
pub mod observability;
pub mod prompt;
pub mod router;
pub mod runtime;
pub mod session;
pub mod tools;
pub mod turn;

use std::sync::Arc;

use sqlx::SqlitePool;

use config::CoreConfig;
use error::CoreError;
use experts::default_registry as default_experts;
use llm::HttpLlmAdapter;
use prompt::PromptRegistry;
use router::Router;
use runtime::{ExpertRuntime, HandoffController};
use session::{SessionLocks, SharedSessionStore, SqliteSessionStore};
use tools::vector::QdrantVectorStore;
use tools::{builder as tool_builder, SqliteStructuredStore, ToolContext};
use turn::CorePipeline;

/// Prompt names every built-in expert and the router need present at
/// startup. Missing any of these fails the process before it serves a
/// single turn, rather than discovering the gap at first use.
pub const REQUIRED_PROMPTS: &[&str] = &["expert_food", "expert_task", "expert_event", "expert_reminder"];

/// Builds a fully wired `CorePipeline` from config: connects the sqlite
/// pool (shared by the session store and the structured tool store),
/// connects to Qdrant, loads prompts, and assembles the router/runtime/
/// handoff capabilities. Everything built here is read-only-after-startup;
/// the only per-session mutable state lives behind the session store and
/// the session lock table.
pub async fn bootstrap(config: CoreConfig) -> Result<CorePipeline, CoreError> {
    config.validate()?;
    let config = Arc::new(config);

    let sqlite_pool = SqlitePool::connect(&config.tools.sqlite_path)
        .await
        .map_err(|e| CoreError::configuration(format!("failed to open sqlite at {}: {e}", config.tools.sqlite_path)))?;

    let structured = Arc::new(SqliteStructuredStore::new(sqlite_pool.clone()));
    structured.ensure_schema().await?;

    let sqlite_sessions = SqliteSessionStore::new(sqlite_pool);
    sqlite_sessions.ensure_schema().await?;
    let session_store: SharedSessionStore = Arc::new(sqlite_sessions);

    let vectors: Arc<dyn tools::vector::VectorStore> = Arc::new(
        QdrantVectorStore::connect(
            &config.tools.qdrant_url,
            &config.tools.qdrant_collection_prefix,
            config.tools.vector_dimensions.clone(),
        )
        .await?,
    );

    let llm = Arc::new(HttpLlmAdapter::new(config.llm.clone()));

    let prompts = Arc::new(PromptRegistry::load(&config.prompt, REQUIRED_PROMPTS)?);

    let experts = default_experts();
    let tool_registry = Arc::new(tool_builder::default_registry());

    let tool_ctx = ToolContext {
        structured,
        vectors,
        llm: llm.clone(),
        config: config.clone(),
    };

    let runtime = ExpertRuntime::new(
        experts.clone(),
        tool_registry,
        llm.clone(),
        prompts.clone(),
        config.runtime.clone(),
    );
    let router = Router::new(experts.clone(), llm.clone(), &config.runtime);
    let handoff = HandoffController::new(experts.clone());

    Ok(CorePipeline {
        config,
        session_store,
        session_locks: Arc::new(SessionLocks::new()),
        router,
        experts,
        runtime,
        handoff,
        tool_ctx,
        prompts,
    })
}
