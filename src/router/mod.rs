// src/router/mod.rs
// Sticky -> keyword -> model-fallback routing: cheapest check first, each
// stage only runs if the previous one didn't produce a confident answer.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::runtime::RuntimeConfig;
use crate::error::CoreError;
use crate::experts::ExpertRegistry;
use crate::llm::LlmAdapter;
use crate::session::Session;

pub struct Router {
    experts: ExpertRegistry,
    llm: Arc<dyn LlmAdapter>,
    default_expert: String,
}

/// Outcome of one routing decision, for observability and tests -- the
/// turn response's `expert` field is derived from this after the turn
/// completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Sticky,
    Keyword,
    ModelFallback,
    Default,
}

impl Router {
    pub fn new(experts: ExpertRegistry, llm: Arc<dyn LlmAdapter>, runtime: &RuntimeConfig) -> Self {
        Self {
            experts,
            llm,
            default_expert: runtime.default_expert.clone(),
        }
    }

    /// Route the new user message, writing `current_expert` onto `session`.
    /// Never calls tools itself. Returns the chosen expert name and how it
    /// was decided.
    pub async fn route(&self, session: &mut Session, message: &str) -> Result<(String, RouteDecision), CoreError> {
        let casefolded = message.to_lowercase();

        // Stage 1: sticky rule. Only sticky when the incumbent has zero
        // *other* experts' triggers matching -- that check is the handoff
        // controller's job post-turn, not the router's; the router's
        // stickiness is just "keep what we have unless nothing was set".
        if let Some(current) = &session.current_expert {
            if self.experts.get(current).is_some() {
                debug!(session_id = %session.session_id, expert = %current, "router: sticky");
                return Ok((current.clone(), RouteDecision::Sticky));
            }
        }

        // Stage 2: keyword rule.
        if let Some(winner) = self.keyword_route(&casefolded, session.current_expert.as_deref()) {
            info!(session_id = %session.session_id, expert = %winner, "router: keyword match");
            session.current_expert = Some(winner.clone());
            return Ok((winner, RouteDecision::Keyword));
        }

        // Stage 3: model fallback.
        let chosen = self.model_fallback(message).await;
        info!(session_id = %session.session_id, expert = %chosen, "router: model fallback");
        session.current_expert = Some(chosen.clone());
        let decision = if chosen == self.default_expert {
            RouteDecision::Default
        } else {
            RouteDecision::ModelFallback
        };
        Ok((chosen, decision))
    }

    /// Returns `Some(expert)` only when exactly one expert holds the
    /// strict maximum score >= 1; ties fall through to the model fallback
    /// stage, after applying the tie-break rules.
    fn keyword_route(&self, casefolded_message: &str, current: Option<&str>) -> Option<String> {
        let mut scores: Vec<(&str, usize)> = self
            .experts
            .iter()
            .map(|e| (e.name.as_str(), e.keyword_score(casefolded_message)))
            .filter(|(_, score)| *score >= 1)
            .collect();

        if scores.is_empty() {
            return None;
        }

        scores.sort_by(|a, b| b.1.cmp(&a.1));
        let top_score = scores[0].1;
        let tied: Vec<&str> = scores
            .iter()
            .filter(|(_, score)| *score == top_score)
            .map(|(name, _)| *name)
            .collect();

        if tied.len() == 1 {
            return Some(tied[0].to_string());
        }

        // Tie-break: prefer current_expert if tied, else priority order.
        if let Some(current) = current {
            if tied.contains(&current) {
                return Some(current.to_string());
            }
        }

        for candidate in self.experts.priority_order() {
            if tied.contains(&candidate.as_str()) {
                return Some(candidate.clone());
            }
        }

        // Priority order didn't cover every tied name; fall through to the
        // model stage rather than guess among the remainder.
        None
    }

    /// Invoke the LLM adapter with a short classification prompt enumerating
    /// expert names and descriptions, constrained to a single expert name.
    /// Unknown/malformed output -> default expert.
    async fn model_fallback(&self, message: &str) -> String {
        let descriptions = self
            .experts
            .iter()
            .map(|e| format!("- {}", e.name))
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are a routing classifier. Reply with exactly one expert name \
             from this list and nothing else:\n{descriptions}"
        );

        let result = self
            .llm
            .complete(crate::llm::CompletionRequest {
                system,
                messages: vec![crate::session::Message::user(message)],
                tools: Vec::new(),
                temperature: Some(0.0),
                max_tokens: Some(16),
            })
            .await;

        match result {
            Ok(response) => {
                let candidate = response.text.trim().to_lowercase();
                if self.experts.get(&candidate).is_some() {
                    candidate
                } else {
                    self.default_expert.clone()
                }
            }
            Err(_) => self.default_expert.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experts::default_registry;
    use crate::llm::fake::ScriptedLlmAdapter;

    fn router_with_fallback(reply: &str) -> Router {
        let experts = default_registry();
        let llm: Arc<dyn LlmAdapter> = Arc::new(ScriptedLlmAdapter::with_texts(vec![reply.to_string()]));
        let runtime = RuntimeConfig::default();
        Router::new(experts, llm, &runtime)
    }

    #[tokio::test]
    async fn keyword_routes_food_on_first_turn() {
        let router = router_with_fallback("task");
        let mut session = Session::new("s1", "u1", "default");
        let (expert, decision) = router
            .route(&mut session, "log that I ate salmon sashimi at home and loved it")
            .await
            .unwrap();
        assert_eq!(expert, "food");
        assert_eq!(decision, RouteDecision::Keyword);
        assert_eq!(session.current_expert.as_deref(), Some("food"));
    }

    #[tokio::test]
    async fn sticky_keeps_current_expert_without_trigger_words() {
        let router = router_with_fallback("task");
        let mut session = Session::new("s2", "u1", "default");
        session.current_expert = Some("food".to_string());
        let (expert, decision) = router
            .route(&mut session, "actually, rate it just liked")
            .await
            .unwrap();
        assert_eq!(expert, "food");
        assert_eq!(decision, RouteDecision::Sticky);
    }

    #[tokio::test]
    async fn ambiguous_message_falls_back_to_model() {
        let router = router_with_fallback("event");
        let mut session = Session::new("s3", "u1", "default");
        let (expert, decision) = router.route(&mut session, "hello there").await.unwrap();
        assert_eq!(expert, "event");
        assert_eq!(decision, RouteDecision::ModelFallback);
    }

    #[tokio::test]
    async fn malformed_model_output_routes_to_default() {
        let router = router_with_fallback("not-a-real-expert");
        let mut session = Session::new("s4", "u1", "default");
        let (expert, decision) = router.route(&mut session, "hello there").await.unwrap();
        assert_eq!(expert, "task");
        assert_eq!(decision, RouteDecision::Default);
    }
}
