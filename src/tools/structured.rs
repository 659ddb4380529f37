// src/tools/structured.rs
// CRUD tool handlers for the eight structured entities (spec §4.5.1).
// Every handler has the same `(ToolContext, Value) -> Result<Value,
// CoreError>` shape so it can sit behind a `ToolHandler` fn pointer.
// Grounded on the teacher's per-tool handler functions
// (examples/ConaryLabs-Mira/backend/src/operations/engine/tool_router.rs).

use std::pin::Pin;

use serde_json::{json, Value};

use super::store::{FoodPreference, ListFilter};
use super::ToolContext;
use crate::error::CoreError;

fn page_limit(ctx: &ToolContext, requested: Option<i64>) -> i64 {
    let requested = requested.unwrap_or(ctx.config.tools.default_page_size as i64);
    requested.clamp(1, ctx.config.tools.max_page_size as i64)
}

fn cursor_of(arguments: &Value) -> Option<i64> {
    arguments.get("cursor").and_then(|v| v.as_i64())
}

type HandlerFuture<'a> = Pin<Box<dyn std::future::Future<Output = Result<Value, CoreError>> + Send + 'a>>;

// ---- Task -----------------------------------------------------------

pub fn create_task<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let title = arguments["title"].as_str().unwrap_or_default();
        let description = arguments.get("description").and_then(|v| v.as_str());
        let due_date = arguments
            .get("due_date")
            .and_then(|v| v.as_str())
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .map_err(|_| CoreError::invalid_argument("due_date must be ISO-8601"))
            })
            .transpose()?;
        let is_recurring = arguments.get("is_recurring").and_then(|v| v.as_bool()).unwrap_or(false);
        let recurrence_rule = arguments.get("recurrence_rule").cloned();

        let task = ctx
            .structured
            .create_task("default-user", "default", title, description, due_date, is_recurring, recurrence_rule, None)
            .await?;
        Ok(json!(task))
    })
}

pub fn get_task<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let task = ctx
            .structured
            .get_task(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("task {id}")))?;
        Ok(json!(task))
    })
}

pub fn update_task<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let task = ctx.structured.update_task(id, &arguments).await?;
        Ok(json!(task))
    })
}

pub fn delete_task<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        ctx.structured.delete_task(id).await?;
        Ok(json!({"deleted": id}))
    })
}

pub fn list_tasks<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let mut equals = Vec::new();
        if let Some(status) = arguments.get("status").and_then(|v| v.as_str()) {
            equals.push(("status", json!(status)));
        }
        let filter = ListFilter {
            equals,
            cursor: cursor_of(&arguments),
            limit: page_limit(ctx, arguments.get("page_size").and_then(|v| v.as_i64())),
        };
        let page = ctx.structured.list_tasks("default-user", "default", &filter).await?;
        Ok(json!(page))
    })
}

/// Expands due recurring parent tasks into instances, idempotent by
/// `(parent_id, next_date)` (spec §4.5 "Recurring task expansion").
pub fn expand_recurring_tasks<'a>(ctx: &'a ToolContext, _arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let now = chrono::Utc::now();
        let due = ctx.structured.due_recurring_tasks(now).await?;
        let mut created = Vec::new();

        for parent in due {
            let Some(next_date) = parent.next_date else { continue };
            if ctx.structured.instance_exists(&parent.id, next_date).await? {
                continue;
            }

            let instance = ctx
                .structured
                .create_task(
                    &parent.user_id,
                    &parent.workspace,
                    &parent.title,
                    parent.description.as_deref(),
                    Some(next_date),
                    false,
                    None,
                    Some(&parent.id),
                )
                .await?;
            created.push(instance.id.clone());

            let following = crate::tools::hybrid::next_occurrence(next_date, parent.recurrence_rule.as_ref());
            if let Some(following) = following {
                ctx.structured.advance_recurring_task(&parent.id, following).await?;
            }
        }

        Ok(json!({"created": created}))
    })
}

// ---- Reminder ---------------------------------------------------------

pub fn create_reminder<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let title = arguments["title"].as_str().unwrap_or_default();
        let remind_at = arguments["remind_at"].as_str().unwrap_or_default();
        let remind_at = chrono::DateTime::parse_from_rfc3339(remind_at)
            .map_err(|_| CoreError::invalid_argument("remind_at must be ISO-8601"))?
            .with_timezone(&chrono::Utc);
        let reminder = ctx.structured.create_reminder("default-user", "default", title, remind_at).await?;
        Ok(json!(reminder))
    })
}

pub fn get_reminder<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let reminder = ctx
            .structured
            .get_reminder(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("reminder {id}")))?;
        Ok(json!(reminder))
    })
}

pub fn update_reminder<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let reminder = ctx.structured.update_reminder(id, &arguments).await?;
        Ok(json!(reminder))
    })
}

pub fn delete_reminder<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        ctx.structured.delete_reminder(id).await?;
        Ok(json!({"deleted": id}))
    })
}

pub fn list_reminders<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let filter = ListFilter {
            equals: Vec::new(),
            cursor: cursor_of(&arguments),
            limit: page_limit(ctx, arguments.get("page_size").and_then(|v| v.as_i64())),
        };
        let page = ctx.structured.list_reminders("default-user", "default", &filter).await?;
        Ok(json!(page))
    })
}

// ---- Event ------------------------------------------------------------

pub fn create_event<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let title = arguments["title"].as_str().unwrap_or_default();
        let starts_at = arguments["starts_at"].as_str().unwrap_or_default();
        let starts_at = chrono::DateTime::parse_from_rfc3339(starts_at)
            .map_err(|_| CoreError::invalid_argument("starts_at must be ISO-8601"))?
            .with_timezone(&chrono::Utc);
        let ends_at = arguments
            .get("ends_at")
            .and_then(|v| v.as_str())
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .map_err(|_| CoreError::invalid_argument("ends_at must be ISO-8601"))
            })
            .transpose()?;
        let location = arguments.get("location").and_then(|v| v.as_str());

        let event = ctx
            .structured
            .create_event("default-user", "default", title, starts_at, ends_at, location)
            .await?;
        Ok(json!(event))
    })
}

pub fn get_event<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let event = ctx
            .structured
            .get_event(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("event {id}")))?;
        Ok(json!(event))
    })
}

pub fn update_event<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let event = ctx.structured.update_event(id, &arguments).await?;
        Ok(json!(event))
    })
}

pub fn delete_event<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        ctx.structured.delete_event(id).await?;
        Ok(json!({"deleted": id}))
    })
}

pub fn list_events<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let filter = ListFilter {
            equals: Vec::new(),
            cursor: cursor_of(&arguments),
            limit: page_limit(ctx, arguments.get("page_size").and_then(|v| v.as_i64())),
        };
        let page = ctx.structured.list_events("default-user", "default", &filter).await?;
        Ok(json!(page))
    })
}

// ---- FoodEntry ----------------------------------------------------------

pub fn create_food_entry<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let name = arguments["name"].as_str().unwrap_or_default();
        let location = arguments.get("location").and_then(|v| v.as_str());
        let preference = arguments["preference"].as_str().unwrap_or("neutral");
        let preference = FoodPreference::parse(preference)
            .ok_or_else(|| CoreError::invalid_argument("preference must be favorite|liked|neutral|disliked"))?;
        let consumed_at = arguments
            .get("consumed_at")
            .and_then(|v| v.as_str())
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .map_err(|_| CoreError::invalid_argument("consumed_at must be ISO-8601"))
            })
            .transpose()?
            .unwrap_or_else(chrono::Utc::now);

        let entry = ctx
            .structured
            .create_food_entry("default-user", "default", name, location, preference, consumed_at)
            .await?;

        // Vector-side mirror for the hybrid recommender (spec §4.5.2): the
        // embedding covers name + location since that's what preference
        // search matches against, not the raw row. Two sequential writes
        // (spec §9): if either the embed call or the vector upsert fails,
        // compensate by deleting the row just inserted so the tool's
        // declared effect stays all-or-nothing (spec §4.5 "Write tools are
        // transactional"), and surface the error to the model so it can
        // retry the whole call.
        let preference_string = format!("{} {}", entry.name, entry.location.clone().unwrap_or_default());
        let embedding = match ctx.llm.embed(&preference_string).await {
            Ok(embedding) => embedding,
            Err(err) => {
                let _ = ctx.structured.delete_food_entry(&entry.id).await;
                return Err(err);
            }
        };

        let mut payload = std::collections::HashMap::new();
        payload.insert("name".to_string(), json!(entry.name));
        payload.insert("entry_id".to_string(), json!(entry.id));
        if let Err(err) = ctx.vectors.upsert("food", &entry.id, embedding, payload).await {
            let _ = ctx.structured.delete_food_entry(&entry.id).await;
            return Err(err);
        }

        Ok(json!(entry))
    })
}

pub fn get_food_entry<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let entry = ctx
            .structured
            .get_food_entry(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("food entry {id}")))?;
        Ok(json!(entry))
    })
}

pub fn update_food_entry<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        let entry = ctx.structured.update_food_entry(id, &arguments).await?;
        Ok(json!(entry))
    })
}

pub fn delete_food_entry<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let id = arguments["id"].as_str().unwrap_or_default();
        ctx.structured.delete_food_entry(id).await?;
        let _ = ctx.vectors.delete("food", id).await;
        Ok(json!({"deleted": id}))
    })
}

pub fn list_food_entries<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let mut equals = Vec::new();
        if let Some(preference) = arguments.get("preference").and_then(|v| v.as_str()) {
            equals.push(("preference", json!(preference)));
        }
        let filter = ListFilter {
            equals,
            cursor: cursor_of(&arguments),
            limit: page_limit(ctx, arguments.get("page_size").and_then(|v| v.as_i64())),
        };
        let page = ctx.structured.list_food_entries("default-user", "default", &filter).await?;
        Ok(json!(page))
    })
}

pub fn find_food_duplicates<'a>(ctx: &'a ToolContext, _arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let entries = ctx.structured.all_active_food_entries("default-user", "default").await?;
        let pairs = crate::tools::hybrid::find_duplicate_pairs(&entries);
        Ok(json!(pairs))
    })
}

pub fn merge_food_entries<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let canonical_id = arguments["canonical_id"].as_str().unwrap_or_default();
        let merged_id = arguments["merged_id"].as_str().unwrap_or_default();
        let result = ctx.structured.merge_food_entries(canonical_id, merged_id).await?;
        let _ = ctx.vectors.delete("food", merged_id).await;
        Ok(json!(result))
    })
}

pub fn recommend_food<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
    Box::pin(async move {
        let preference_text = arguments.get("preference_text").and_then(|v| v.as_str()).unwrap_or("");
        crate::tools::hybrid::recommend_food(ctx, "default-user", "default", preference_text).await
    })
}

// ---- simple entities (note / document / memory / conversation) -------

macro_rules! simple_entity_handlers {
    ($table:literal, $create:ident, $get:ident, $update:ident, $delete:ident, $list:ident) => {
        pub fn $create<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
            Box::pin(async move {
                let title = arguments["title"].as_str().unwrap_or_default();
                let content = arguments["content"].as_str().unwrap_or_default();
                let row = ctx.structured.create_simple($table, "default-user", "default", title, content).await?;
                Ok(json!(row))
            })
        }

        pub fn $get<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
            Box::pin(async move {
                let id = arguments["id"].as_str().unwrap_or_default();
                let row = ctx
                    .structured
                    .get_simple($table, id)
                    .await?
                    .ok_or_else(|| CoreError::not_found(format!("{} {id}", $table)))?;
                Ok(json!(row))
            })
        }

        pub fn $update<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
            Box::pin(async move {
                let id = arguments["id"].as_str().unwrap_or_default();
                let row = ctx.structured.update_simple($table, id, &arguments).await?;
                Ok(json!(row))
            })
        }

        pub fn $delete<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
            Box::pin(async move {
                let id = arguments["id"].as_str().unwrap_or_default();
                ctx.structured.delete_simple($table, id).await?;
                Ok(json!({"deleted": id}))
            })
        }

        pub fn $list<'a>(ctx: &'a ToolContext, arguments: Value) -> HandlerFuture<'a> {
            Box::pin(async move {
                let filter = ListFilter {
                    equals: Vec::new(),
                    cursor: cursor_of(&arguments),
                    limit: page_limit(ctx, arguments.get("page_size").and_then(|v| v.as_i64())),
                };
                let page = ctx.structured.list_simple($table, "default-user", "default", &filter).await?;
                Ok(json!(page))
            })
        }
    };
}

simple_entity_handlers!("notes", create_note, get_note, update_note, delete_note, list_notes);
simple_entity_handlers!("documents", create_document, get_document, update_document, delete_document, list_documents);
simple_entity_handlers!("memories", create_memory, get_memory, update_memory, delete_memory, list_memories);
simple_entity_handlers!(
    "conversations",
    create_conversation,
    get_conversation,
    update_conversation,
    delete_conversation,
    list_conversations
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::llm::fake::ScriptedLlmAdapter;
    use crate::llm::LlmAdapter;
    use crate::tools::vector::InMemoryVectorStore;
    use crate::tools::SqliteStructuredStore;
    use sqlx::SqlitePool;
    use std::sync::Arc;

    async fn test_ctx(embeddings: Vec<Vec<f32>>) -> ToolContext {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteStructuredStore::new(pool);
        store.ensure_schema().await.unwrap();
        let config = Arc::new(CoreConfig::default());
        let vectors = InMemoryVectorStore::shared(config.tools.vector_dimensions.clone());
        let llm: Arc<dyn LlmAdapter> = Arc::new(ScriptedLlmAdapter::new(Vec::new()).with_embeddings(embeddings));
        ToolContext {
            structured: Arc::new(store),
            vectors,
            llm,
            config,
        }
    }

    #[tokio::test]
    async fn create_food_entry_upserts_a_vector_on_success() {
        let dims = crate::config::CoreConfig::default().tools.vector_dimensions["food"];
        let ctx = test_ctx(vec![vec![0.1; dims]]).await;
        let result = create_food_entry(
            &ctx,
            json!({"name": "salmon sashimi", "location": "home", "preference": "favorite"}),
        )
        .await
        .unwrap();
        assert_eq!(result["name"], "salmon sashimi");
    }

    #[tokio::test]
    async fn create_food_entry_deletes_row_when_embedding_fails() {
        // No embeddings scripted -> the fake adapter's `embed` call fails.
        let ctx = test_ctx(Vec::new()).await;
        let err = create_food_entry(
            &ctx,
            json!({"name": "ramen", "location": "home", "preference": "liked"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));

        let page = ctx
            .structured
            .list_food_entries("default-user", "default", &ListFilter::default())
            .await
            .unwrap();
        assert!(page.items.is_empty(), "compensating delete should leave no row behind");
    }
}
