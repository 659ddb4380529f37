// src/experts/builtin.rs
// The four domain experts this deployment ships with: food, tasks,
// calendar events, reminders. A real deployment could load additional
// experts from configuration.

use super::{ExpertDescriptor, ExpertRegistry};

pub fn food_expert() -> ExpertDescriptor {
    ExpertDescriptor::new("food", "expert_food")
        .with_tools([
            "create_food_entry",
            "update_food_entry",
            "delete_food_entry",
            "list_food_entries",
            "get_food_entry",
            "find_food_duplicates",
            "merge_food_entries",
            "recommend_food",
        ])
        .with_keywords([
            "food", "eat", "ate", "eaten", "meal", "recipe", "restaurant", "dinner", "lunch",
            "breakfast", "snack", "hungry", "craving", "sashimi", "pizza", "duplicate",
        ])
}

pub fn task_expert() -> ExpertDescriptor {
    ExpertDescriptor::new("task", "expert_task")
        .with_tools([
            "create_task",
            "update_task",
            "delete_task",
            "list_tasks",
            "get_task",
            "expand_recurring_tasks",
        ])
        .with_keywords(["task", "todo", "to-do", "chore", "checklist"])
}

pub fn event_expert() -> ExpertDescriptor {
    ExpertDescriptor::new("event", "expert_event")
        .with_tools([
            "create_event",
            "update_event",
            "delete_event",
            "list_events",
            "get_event",
        ])
        .with_keywords([
            "event", "calendar", "meeting", "appointment", "schedule", "invite",
        ])
}

pub fn reminder_expert() -> ExpertDescriptor {
    ExpertDescriptor::new("reminder", "expert_reminder")
        .with_tools([
            "create_reminder",
            "update_reminder",
            "delete_reminder",
            "list_reminders",
            "get_reminder",
        ])
        .with_keywords(["remind", "reminder", "alert", "notify", "ping me"])
}

/// The registry this deployment starts with. Priority order on keyword
/// ties favors task over the others since `default_expert` defaults to
/// `"task"` (see `RuntimeConfig`).
pub fn default_registry() -> ExpertRegistry {
    ExpertRegistry::new(
        vec![food_expert(), task_expert(), event_expert(), reminder_expert()],
        vec![
            "task".to_string(),
            "food".to_string(),
            "event".to_string(),
            "reminder".to_string(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn food_keywords_detect_sashimi_message() {
        let expert = food_expert();
        let msg = "log that i ate salmon sashimi at home and loved it".to_string();
        assert!(expert.keyword_score(&msg) >= 1);
    }

    #[test]
    fn task_keyword_detects_task_word() {
        let expert = task_expert();
        let msg = "also add a task to buy more salmon next week".to_string();
        assert!(expert.keyword_score(&msg) >= 1);
    }

    #[test]
    fn registry_exposes_all_four_experts() {
        let registry = default_registry();
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["event", "food", "reminder", "task"]);
    }
}
