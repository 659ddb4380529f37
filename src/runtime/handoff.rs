// src/runtime/handoff.rs
// Handoff controller: post-iteration keyword scan against *other*
// experts' trigger tables, bounded to one re-entry per turn.

use crate::experts::ExpertRegistry;
use crate::session::{Handoff, Session};

pub struct HandoffController {
    experts: ExpertRegistry,
}

impl HandoffController {
    pub fn new(experts: ExpertRegistry) -> Self {
        Self { experts }
    }

    /// Scans `user_message` against every expert other than
    /// `current_expert`'s `keyword_triggers`. Returns the first other
    /// expert whose triggers match, along with the matched term, or
    /// `None` if no trigger matched.
    pub fn detect(&self, current_expert: &str, user_message: &str) -> Option<(String, String)> {
        let casefolded = user_message.to_lowercase();

        let mut candidates: Vec<(&str, &str)> = Vec::new();
        for expert in self.experts.others(current_expert) {
            if let Some(term) = expert
                .keyword_triggers
                .iter()
                .find(|kw| casefolded.contains(kw.as_str()))
            {
                candidates.push((expert.name.as_str(), term.as_str()));
            }
        }

        // Deterministic pick among multiple simultaneous matches: prefer
        // the registry's priority order, the same tie-break the router
        // uses, for consistency rather than inventing a second ordering
        // rule.
        for candidate in self.experts.priority_order() {
            if let Some((name, term)) = candidates.iter().find(|(n, _)| *n == candidate.as_str()) {
                return Some((name.to_string(), term.to_string()));
            }
        }

        candidates
            .into_iter()
            .next()
            .map(|(name, term)| (name.to_string(), term.to_string()))
    }

    /// Applies a detected handoff to the session: records `handoff` and
    /// flips `current_expert`. Caller is responsible for the
    /// one-reentry-per-turn bound (`handoff_max_per_turn`).
    pub fn apply(&self, session: &mut Session, source: &str, target: &str, matched_term: &str) {
        session.handoff = Some(Handoff {
            source: source.to_string(),
            target: target.to_string(),
            reason: format!("domain shift: {matched_term}"),
        });
        session.current_expert = Some(target.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experts::default_registry;

    #[test]
    fn detects_task_handoff_from_food() {
        let controller = HandoffController::new(default_registry());
        let result = controller.detect("food", "also add a task to buy more salmon next week");
        assert_eq!(result.as_ref().map(|(name, _)| name.as_str()), Some("task"));
    }

    #[test]
    fn no_match_returns_none() {
        let controller = HandoffController::new(default_registry());
        assert!(controller.detect("food", "rate it just liked").is_none());
    }

    #[test]
    fn apply_sets_handoff_and_current_expert() {
        let controller = HandoffController::new(default_registry());
        let mut session = Session::new("s1", "u1", "default");
        session.current_expert = Some("food".to_string());

        controller.apply(&mut session, "food", "task", "task");

        assert_eq!(session.current_expert.as_deref(), Some("task"));
        let handoff = session.handoff.as_ref().unwrap();
        assert_eq!(handoff.source, "food");
        assert_eq!(handoff.target, "task");
        assert_eq!(handoff.reason, "domain shift: task");
    }
}
