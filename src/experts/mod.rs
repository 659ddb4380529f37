// src/experts/mod.rs
// Expert descriptor registry: experts are plain data (system prompt,
// allowed tools, keyword/handoff triggers), not subclasses, built once
// at startup and never mutated — so a `HashMap` behind an `Arc` is
// enough, no interior mutability needed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Static registration record for one domain persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertDescriptor {
    pub name: String,
    /// Name of the prompt template in the prompt registry, not the
    /// rendered text itself.
    pub system_prompt: String,
    pub allowed_tools: HashSet<String>,
    /// Casefolded terms that route a first/ambiguous turn to this expert
    /// and that trigger a handoff *into* this expert from any other.
    pub keyword_triggers: HashSet<String>,
    /// Kept for descriptor completeness; the handoff controller in this
    /// implementation scans every other expert's `keyword_triggers`
    /// uniformly, so this map currently only documents per-pair
    /// relationships rather than gating them.
    pub handoff_triggers: HashMap<String, HashSet<String>>,
}

impl ExpertDescriptor {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            allowed_tools: HashSet::new(),
            keyword_triggers: HashSet::new(),
            handoff_triggers: HashMap::new(),
        }
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keyword_triggers = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_handoff(mut self, target: impl Into<String>, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.handoff_triggers
            .insert(target.into(), terms.into_iter().map(Into::into).collect());
        self
    }

    /// Count of this expert's keyword triggers present in the (already
    /// casefolded) message.
    pub fn keyword_score(&self, casefolded_message: &str) -> usize {
        self.keyword_triggers
            .iter()
            .filter(|kw| casefolded_message.contains(kw.as_str()))
            .count()
    }
}

/// Read-only, write-once-at-startup registry of experts — the only
/// global state in the core besides the tool and prompt registries.
#[derive(Clone)]
pub struct ExpertRegistry {
    experts: Arc<HashMap<String, ExpertDescriptor>>,
    /// Tie-break order for keyword ties without a sticky `current_expert`.
    priority_order: Arc<Vec<String>>,
}

impl ExpertRegistry {
    pub fn new(experts: Vec<ExpertDescriptor>, priority_order: Vec<String>) -> Self {
        let experts = experts
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect::<HashMap<_, _>>();
        Self {
            experts: Arc::new(experts),
            priority_order: Arc::new(priority_order),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ExpertDescriptor> {
        self.experts.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&ExpertDescriptor, CoreError> {
        self.get(name)
            .ok_or_else(|| CoreError::configuration(format!("unknown expert: {name}")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.experts.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpertDescriptor> {
        self.experts.values()
    }

    pub fn priority_order(&self) -> &[String] {
        &self.priority_order
    }

    /// Experts other than `name`, for the handoff controller's cross-expert
    /// scan.
    pub fn others(&self, name: &str) -> impl Iterator<Item = &ExpertDescriptor> {
        self.experts.values().filter(move |e| e.name != name)
    }
}

pub mod builtin;

pub use builtin::default_registry;
