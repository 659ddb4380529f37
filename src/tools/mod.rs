// src/tools/mod.rs
// Tool layer (spec §4.5): a static `ToolDescriptor` registry plus the
// dispatch table the expert runtime calls into. Grounded on the teacher's
// `ToolBuilder` schema shape
// (examples/ConaryLabs-Mira/backend/src/operations/tool_builder.rs) for
// parameter declarations and its `match tool_name { ... }` dispatch table
// (examples/ConaryLabs-Mira/backend/src/operations/engine/tool_router.rs
// `ToolRouter::route_tool_call`) for `ToolRegistry::dispatch`.

pub mod builder;
pub mod hybrid;
pub mod schema;
pub mod store;
pub mod structured;
pub mod vector;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::llm::{LlmAdapter, ToolSchema};

pub use schema::ParameterSchema;
pub use store::SqliteStructuredStore;
pub use vector::{QdrantVectorStore, VectorStore};

/// Declared statically per tool (spec §3 "Tool descriptor", §4.5 "Side-
/// effect class is declared statically").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectClass {
    Read,
    Write,
    External,
}

/// One registered tool. `handler` is a plain async fn pointer rather than a
/// trait object -- every handler in this core has the identical
/// `(ToolContext, Value) -> Result<Value, CoreError>` shape, so a
/// function-pointer table is simpler than a trait per tool (spec §9:
/// "Implementations are values, not subclasses").
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: ParameterSchema,
    pub side_effect: SideEffectClass,
    pub idempotent: bool,
    pub handler: ToolHandler,
}

pub type ToolHandler = for<'a> fn(
    &'a ToolContext,
    Value,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, CoreError>> + Send + 'a>>;

/// Capabilities a tool handler needs: the structured store, the vector
/// store, the LLM adapter (for embedding calls), and the bits of config
/// that bound pagination/recency/etc. Built once at startup and handed to
/// every dispatch (spec §5: "no core-level global mutable state except
/// the tool and prompt registries").
#[derive(Clone)]
pub struct ToolContext {
    pub structured: Arc<SqliteStructuredStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub llm: Arc<dyn LlmAdapter>,
    pub config: Arc<CoreConfig>,
}

pub struct ToolRegistry {
    descriptors: HashMap<&'static str, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into_iter().map(|d| (d.name, d)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.keys().copied()
    }

    /// Builds the `tools` array the LLM adapter needs for one expert call,
    /// restricted to that expert's `allowed_tools` (spec §4.3 step 2).
    pub fn schemas_for(&self, allowed: &std::collections::HashSet<String>) -> Vec<ToolSchema> {
        allowed
            .iter()
            .filter_map(|name| self.descriptors.get(name.as_str()))
            .map(|d| ToolSchema {
                name: d.name.to_string(),
                description: d.description.to_string(),
                parameters: d.parameters.to_json_schema(),
            })
            .collect()
    }

    /// Validate arguments, then dispatch to the handler with a per-tool
    /// timeout and the declared retry policy (spec §4.5 "Failure
    /// semantics"): transient errors retry up to 3 times with exponential
    /// backoff (1s, 2s, 4s) for read/idempotent-write tools only;
    /// non-idempotent writes fail fast.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        name: &str,
        arguments: Value,
        tool_timeout: Duration,
    ) -> Result<Value, CoreError> {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| CoreError::invalid_argument(format!("unknown tool: {name}")))?;

        let arguments = descriptor.parameters.validate(&arguments)?;

        let retryable_class =
            matches!(descriptor.side_effect, SideEffectClass::Read) || descriptor.idempotent;
        let max_attempts = if retryable_class { 3 } else { 1 };

        let mut last_err: Option<CoreError> = None;
        for attempt in 0..max_attempts {
            let call = (descriptor.handler)(ctx, arguments.clone());
            match tokio::time::timeout(tool_timeout, call).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if err.retryable() && attempt + 1 < max_attempts => {
                    warn!(tool = name, attempt, error = %err, "tool call failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
                    last_err = Some(err);
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    let timeout_err = CoreError::TimedOut(format!("tool {name} timed out"));
                    if attempt + 1 < max_attempts {
                        warn!(tool = name, attempt, "tool call timed out, retrying");
                        tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
                        last_err = Some(timeout_err);
                    } else {
                        return Err(timeout_err);
                    }
                }
            }
        }

        info!(tool = name, "tool call exhausted retries");
        Err(last_err.unwrap_or_else(|| CoreError::Internal("tool dispatch failed with no error".to_string())))
    }
}

pub use builder::default_registry;
