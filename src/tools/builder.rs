// src/tools/builder.rs
// Wires every `ToolDescriptor` into the startup registry (spec §4.5).
// Grounded on the teacher's flat list-of-tools construction
// (examples/ConaryLabs-Mira/backend/src/operations/tool_builder.rs usage
// sites) generalized from per-codebase-operation tools to the spec's
// per-entity CRUD plus the three bespoke food/recurring algorithms.

use super::schema::fields;
use super::schema::ParameterSchema;
use super::structured as h;
use super::{SideEffectClass, ToolDescriptor, ToolRegistry};

fn id_schema() -> ParameterSchema {
    ParameterSchema::new().field("id", fields::required_string("entity id"))
}

fn list_schema(extra: Option<(&str, Vec<&str>)>) -> ParameterSchema {
    let mut schema = ParameterSchema::new()
        .field("cursor", fields::optional_integer("pagination cursor from a previous page"))
        .field("page_size", fields::optional_integer("page size, default and max set by the deployment"));
    if let Some((name, values)) = extra {
        schema = schema.field(name, fields::optional_enum("filter by this field", &values));
    }
    schema
}

/// Pushes the five CRUD descriptors for one of the simple title/content
/// entities. A macro rather than a function because `ToolDescriptor::name`
/// and `::description` need `&'static str`s, which a function building
/// names at runtime can't hand back without leaking.
macro_rules! push_simple_entity_tools {
    ($descriptors:expr, $singular:literal, $plural:literal, $create:expr, $get:expr, $update:expr, $delete:expr, $list:expr) => {
        $descriptors.push(ToolDescriptor {
            name: concat!("create_", $singular),
            description: concat!("Create a new ", $singular, "."),
            parameters: ParameterSchema::new()
                .field("title", fields::required_string("title"))
                .field("content", fields::required_string("body text")),
            side_effect: SideEffectClass::Write,
            idempotent: false,
            handler: $create,
        });
        $descriptors.push(ToolDescriptor {
            name: concat!("get_", $singular),
            description: concat!("Fetch a ", $singular, " by id."),
            parameters: id_schema(),
            side_effect: SideEffectClass::Read,
            idempotent: true,
            handler: $get,
        });
        $descriptors.push(ToolDescriptor {
            name: concat!("update_", $singular),
            description: concat!("Apply a partial update to a ", $singular, "."),
            parameters: id_schema()
                .field("title", fields::optional_string("new title"))
                .field("content", fields::optional_string("new body text")),
            side_effect: SideEffectClass::Write,
            idempotent: true,
            handler: $update,
        });
        $descriptors.push(ToolDescriptor {
            name: concat!("delete_", $singular),
            description: concat!("Delete a ", $singular, " by id."),
            parameters: id_schema(),
            side_effect: SideEffectClass::Write,
            idempotent: true,
            handler: $delete,
        });
        $descriptors.push(ToolDescriptor {
            name: concat!("list_", $plural),
            description: concat!("List ", $plural, "."),
            parameters: list_schema(None),
            side_effect: SideEffectClass::Read,
            idempotent: true,
            handler: $list,
        });
    };
}

pub fn default_registry() -> ToolRegistry {
    let mut descriptors = Vec::new();

    // --- tasks -----------------------------------------------------
    descriptors.push(ToolDescriptor {
        name: "create_task",
        description: "Create a new task, optionally recurring.",
        parameters: ParameterSchema::new()
            .field("title", fields::required_string("task title"))
            .field("description", fields::optional_string("task description"))
            .field("due_date", fields::optional_timestamp("ISO-8601 due date"))
            .field("is_recurring", fields::optional_boolean("whether this task recurs"))
            .field("recurrence_rule", fields::optional_object("{unit: days|weeks|months, interval: integer}")),
        side_effect: SideEffectClass::Write,
        idempotent: false,
        handler: h::create_task,
    });
    descriptors.push(ToolDescriptor {
        name: "get_task",
        description: "Fetch a task by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::get_task,
    });
    descriptors.push(ToolDescriptor {
        name: "update_task",
        description: "Apply a partial update to a task.",
        parameters: id_schema()
            .field("title", fields::optional_string("new title"))
            .field("description", fields::optional_string("new description"))
            .field("status", fields::optional_enum("new status", &["open", "done", "cancelled"]))
            .field("due_date", fields::optional_timestamp("new ISO-8601 due date")),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::update_task,
    });
    descriptors.push(ToolDescriptor {
        name: "delete_task",
        description: "Delete a task by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::delete_task,
    });
    descriptors.push(ToolDescriptor {
        name: "list_tasks",
        description: "List tasks, optionally filtered by status.",
        parameters: list_schema(Some(("status", vec!["open", "done", "cancelled"]))),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::list_tasks,
    });
    descriptors.push(ToolDescriptor {
        name: "expand_recurring_tasks",
        description: "Create due instances of recurring tasks. Safe to call repeatedly.",
        parameters: ParameterSchema::new(),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::expand_recurring_tasks,
    });

    // --- reminders ---------------------------------------------------
    descriptors.push(ToolDescriptor {
        name: "create_reminder",
        description: "Create a reminder for a specific time.",
        parameters: ParameterSchema::new()
            .field("title", fields::required_string("reminder title"))
            .field("remind_at", fields::required_timestamp("ISO-8601 time to remind at")),
        side_effect: SideEffectClass::Write,
        idempotent: false,
        handler: h::create_reminder,
    });
    descriptors.push(ToolDescriptor {
        name: "get_reminder",
        description: "Fetch a reminder by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::get_reminder,
    });
    descriptors.push(ToolDescriptor {
        name: "update_reminder",
        description: "Apply a partial update to a reminder.",
        parameters: id_schema()
            .field("title", fields::optional_string("new title"))
            .field("remind_at", fields::optional_timestamp("new ISO-8601 time"))
            .field("done", fields::optional_boolean("mark done or not done")),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::update_reminder,
    });
    descriptors.push(ToolDescriptor {
        name: "delete_reminder",
        description: "Delete a reminder by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::delete_reminder,
    });
    descriptors.push(ToolDescriptor {
        name: "list_reminders",
        description: "List reminders.",
        parameters: list_schema(None),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::list_reminders,
    });

    // --- events -------------------------------------------------------
    descriptors.push(ToolDescriptor {
        name: "create_event",
        description: "Create a calendar event.",
        parameters: ParameterSchema::new()
            .field("title", fields::required_string("event title"))
            .field("starts_at", fields::required_timestamp("ISO-8601 start time"))
            .field("ends_at", fields::optional_timestamp("ISO-8601 end time"))
            .field("location", fields::optional_string("event location")),
        side_effect: SideEffectClass::Write,
        idempotent: false,
        handler: h::create_event,
    });
    descriptors.push(ToolDescriptor {
        name: "get_event",
        description: "Fetch an event by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::get_event,
    });
    descriptors.push(ToolDescriptor {
        name: "update_event",
        description: "Apply a partial update to an event.",
        parameters: id_schema()
            .field("title", fields::optional_string("new title"))
            .field("starts_at", fields::optional_timestamp("new ISO-8601 start time"))
            .field("location", fields::optional_string("new location")),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::update_event,
    });
    descriptors.push(ToolDescriptor {
        name: "delete_event",
        description: "Delete an event by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::delete_event,
    });
    descriptors.push(ToolDescriptor {
        name: "list_events",
        description: "List events.",
        parameters: list_schema(None),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::list_events,
    });

    // --- food entries --------------------------------------------------
    descriptors.push(ToolDescriptor {
        name: "create_food_entry",
        description: "Record a food eaten, with a rating.",
        parameters: ParameterSchema::new()
            .field("name", fields::required_string("food name"))
            .field("location", fields::optional_string("where it was eaten"))
            .field("preference", fields::required_enum("rating", &["favorite", "liked", "neutral", "disliked"]))
            .field("consumed_at", fields::optional_timestamp("ISO-8601 time eaten, defaults to now")),
        side_effect: SideEffectClass::Write,
        idempotent: false,
        handler: h::create_food_entry,
    });
    descriptors.push(ToolDescriptor {
        name: "get_food_entry",
        description: "Fetch a food entry by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::get_food_entry,
    });
    descriptors.push(ToolDescriptor {
        name: "update_food_entry",
        description: "Apply a partial update to a food entry.",
        parameters: id_schema()
            .field("name", fields::optional_string("new name"))
            .field("preference", fields::optional_enum("new rating", &["favorite", "liked", "neutral", "disliked"]))
            .field("location", fields::optional_string("new location")),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::update_food_entry,
    });
    descriptors.push(ToolDescriptor {
        name: "delete_food_entry",
        description: "Delete a food entry by id.",
        parameters: id_schema(),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::delete_food_entry,
    });
    descriptors.push(ToolDescriptor {
        name: "list_food_entries",
        description: "List food entries, optionally filtered by rating.",
        parameters: list_schema(Some(("preference", vec!["favorite", "liked", "neutral", "disliked"]))),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::list_food_entries,
    });
    descriptors.push(ToolDescriptor {
        name: "find_food_duplicates",
        description: "Find pairs of food entries that likely refer to the same food.",
        parameters: ParameterSchema::new(),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::find_food_duplicates,
    });
    descriptors.push(ToolDescriptor {
        name: "merge_food_entries",
        description: "Merge one food entry into another, marking the merged one as such.",
        parameters: ParameterSchema::new()
            .field("canonical_id", fields::required_string("the entry to keep"))
            .field("merged_id", fields::required_string("the entry to mark merged")),
        side_effect: SideEffectClass::Write,
        idempotent: true,
        handler: h::merge_food_entries,
    });
    descriptors.push(ToolDescriptor {
        name: "recommend_food",
        description: "Recommend foods to eat based on past ratings and a preference description.",
        parameters: ParameterSchema::new()
            .field("preference_text", fields::required_string("what the user is in the mood for")),
        side_effect: SideEffectClass::Read,
        idempotent: true,
        handler: h::recommend_food,
    });

    // --- simple entities -------------------------------------------------
    push_simple_entity_tools!(
        descriptors, "note", "notes",
        h::create_note, h::get_note, h::update_note, h::delete_note, h::list_notes
    );
    push_simple_entity_tools!(
        descriptors, "document", "documents",
        h::create_document, h::get_document, h::update_document, h::delete_document, h::list_documents
    );
    push_simple_entity_tools!(
        descriptors, "memory", "memories",
        h::create_memory, h::get_memory, h::update_memory, h::delete_memory, h::list_memories
    );
    push_simple_entity_tools!(
        descriptors, "conversation", "conversations",
        h::create_conversation, h::get_conversation, h::update_conversation, h::delete_conversation, h::list_conversations
    );

    ToolRegistry::new(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_one_entry_per_tool_name() {
        let registry = default_registry();
        assert!(registry.get("create_task").is_some());
        assert!(registry.get("recommend_food").is_some());
        assert!(registry.get("list_notes").is_some());
        assert!(registry.get("expand_recurring_tasks").is_some());
        assert!(registry.get("no_such_tool").is_none());
    }

    #[test]
    fn schemas_for_filters_to_allowed_set() {
        let registry = default_registry();
        let allowed: std::collections::HashSet<String> =
            ["create_food_entry".to_string(), "recommend_food".to_string()].into_iter().collect();
        let schemas = registry.schemas_for(&allowed);
        assert_eq!(schemas.len(), 2);
    }
}
