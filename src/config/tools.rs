// src/config/tools.rs
// Structured store, vector store, and pagination/truncation defaults for
// the tool layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helpers::env_parsed;
use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path to the sqlite database backing structured entities. `:memory:`
    /// is accepted for tests.
    pub sqlite_path: String,
    /// Qdrant gRPC/HTTP endpoint.
    pub qdrant_url: String,
    /// Prefix prepended to every collection name, so one Qdrant instance can
    /// host more than one deployment of the core without collision.
    pub qdrant_collection_prefix: String,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Max rows a single structured list/search call may return regardless
    /// of the caller's requested page size.
    pub max_rows_per_call: usize,
    /// Number of hybrid-search candidates pulled from the structured
    /// pre-filter before vector re-ranking in the food recommendation.
    pub hybrid_candidate_pool: usize,
    /// Declared dimensionality per vector collection. An upsert whose
    /// embedding doesn't match the declared dimension for its collection
    /// fails `SchemaMismatch` before any network call.
    pub vector_dimensions: HashMap<String, usize>,
    /// Recency threshold (days) for the hybrid food recommendation's
    /// structured pre-filter: foods eaten more recently than this are
    /// excluded from candidates.
    pub food_recency_threshold_days: i64,
}

impl ToolConfig {
    pub fn from_env() -> Self {
        Self {
            sqlite_path: super::helpers::env_or("SQLITE_PATH", "assistant-core.db"),
            qdrant_url: super::helpers::env_or("QDRANT_URL", "http://localhost:6334"),
            qdrant_collection_prefix: super::helpers::env_or(
                "QDRANT_COLLECTION_PREFIX",
                "assistant_core",
            ),
            default_page_size: env_parsed("TOOLS_DEFAULT_PAGE_SIZE", 50),
            max_page_size: env_parsed("TOOLS_MAX_PAGE_SIZE", 500),
            max_rows_per_call: env_parsed("TOOLS_MAX_ROWS_PER_CALL", 500),
            hybrid_candidate_pool: env_parsed("TOOLS_HYBRID_CANDIDATE_POOL", 200),
            vector_dimensions: default_vector_dimensions(),
            food_recency_threshold_days: env_parsed("FOOD_RECENCY_THRESHOLD_DAYS", 3),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sqlite_path.trim().is_empty() {
            return Err(CoreError::configuration("sqlite_path must not be empty"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(CoreError::configuration(
                "default_page_size must be >= 1 and <= max_page_size",
            ));
        }
        if self.max_page_size > self.max_rows_per_call {
            return Err(CoreError::configuration(
                "max_page_size must be <= max_rows_per_call",
            ));
        }
        if self.vector_dimensions.values().any(|d| *d == 0) {
            return Err(CoreError::configuration(
                "vector_dimensions entries must be >= 1",
            ));
        }
        Ok(())
    }
}

fn default_vector_dimensions() -> HashMap<String, usize> {
    let dims: usize = env_parsed("LLM_EMBEDDING_DIMENSIONS", 768);
    ["food", "note", "conversation", "document", "memory"]
        .into_iter()
        .map(|name| (name.to_string(), dims))
        .collect()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
