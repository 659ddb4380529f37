// src/tools/store/sqlite.rs
// Relational store backing the structured data tools (spec §4.5.1): one
// sqlite table per domain entity, keyed by a UUID primary key plus
// `user_id`/`workspace` for logical scoping (not multi-tenant isolation,
// an explicit Non-goal -- a single-user deployment may still track more
// than one workspace in one database file). List filters compile to
// parameterized `WHERE` clauses over a small allow-listed set of columns
// per entity; there is no free-form query tool. Grounded on the teacher's
// `sqlx::query`/`Row::get` usage throughout
// (examples/ConaryLabs-Mira/backend/src/cache/session_state_store.rs,
// examples/ConaryLabs-Mira/backend/src/session/manager.rs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::CoreError;

/// Opaque, `offset`-style pagination cursor (spec §4.5.1: "opaque,
/// base64-free integers... sufficient for a single-user dataset size").
pub type Cursor = i64;

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Allow-listed `column = value` equality filters; the caller-facing
    /// tool handlers are responsible for restricting keys to the
    /// per-entity allow-list before this reaches the store.
    pub equals: Vec<(&'static str, Value)>,
    pub cursor: Option<Cursor>,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

/// Generic row shape for the four "simple" entities (`note`, `document`,
/// `memory`, `conversation`) that have no bespoke columns beyond
/// title/content (spec §4.5 lists them alongside task/reminder/event/
/// food_entry, but no algorithm in the spec gives them extra structure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: String,
    pub user_id: String,
    pub workspace: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub workspace: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurrence_rule: Option<Value>,
    pub parent_task_id: Option<String>,
    pub next_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    pub workspace: String,
    pub title: String,
    pub remind_at: DateTime<Utc>,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub workspace: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodPreference {
    Favorite,
    Liked,
    Neutral,
    Disliked,
}

impl FoodPreference {
    fn as_str(self) -> &'static str {
        match self {
            FoodPreference::Favorite => "favorite",
            FoodPreference::Liked => "liked",
            FoodPreference::Neutral => "neutral",
            FoodPreference::Disliked => "disliked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "favorite" => Some(Self::Favorite),
            "liked" => Some(Self::Liked),
            "neutral" => Some(Self::Neutral),
            "disliked" => Some(Self::Disliked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodEntry {
    pub id: String,
    pub user_id: String,
    pub workspace: String,
    pub name: String,
    pub location: Option<String>,
    pub preference: String,
    pub consumed_at: DateTime<Utc>,
    pub is_merged: bool,
    pub merged_from: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct SqliteStructuredStore {
    pool: SqlitePool,
}

impl SqliteStructuredStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                workspace TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                due_date TEXT,
                is_recurring INTEGER NOT NULL DEFAULT 0,
                recurrence_rule TEXT,
                parent_task_id TEXT,
                next_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                workspace TEXT NOT NULL,
                title TEXT NOT NULL,
                remind_at TEXT NOT NULL,
                done INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                workspace TEXT NOT NULL,
                title TEXT NOT NULL,
                starts_at TEXT NOT NULL,
                ends_at TEXT,
                location TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS food_entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                workspace TEXT NOT NULL,
                name TEXT NOT NULL,
                location TEXT,
                preference TEXT NOT NULL,
                consumed_at TEXT NOT NULL,
                is_merged INTEGER NOT NULL DEFAULT 0,
                merged_from TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for table in ["notes", "documents", "memories", "conversations"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    workspace TEXT NOT NULL,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    // ---- Task ---------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        user_id: &str,
        workspace: &str,
        title: &str,
        description: Option<&str>,
        due_date: Option<DateTime<Utc>>,
        is_recurring: bool,
        recurrence_rule: Option<Value>,
        parent_task_id: Option<&str>,
    ) -> Result<Task, CoreError> {
        let id = Self::new_id();
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO tasks (id, user_id, workspace, title, description, status, due_date,
                is_recurring, recurrence_rule, parent_task_id, next_date, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, 'open', ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(workspace)
        .bind(title)
        .bind(description)
        .bind(due_date.map(|d| d.to_rfc3339()))
        .bind(is_recurring as i64)
        .bind(recurrence_rule.as_ref().map(|v| v.to_string()))
        .bind(parent_task_id)
        .bind(due_date.map(|d| d.to_rfc3339()))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_task(&id).await?.ok_or_else(|| CoreError::Internal("task not found after insert".to_string()))
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, CoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::row_to_task(&r)))
    }

    pub async fn update_task(&self, id: &str, patch: &Value) -> Result<Task, CoreError> {
        let existing = self
            .get_task(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("task {id}")))?;

        let title = patch.get("title").and_then(|v| v.as_str()).unwrap_or(&existing.title);
        let description = patch
            .get("description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or(existing.description.clone());
        let status = patch.get("status").and_then(|v| v.as_str()).unwrap_or(&existing.status);
        let due_date = match patch.get("due_date").and_then(|v| v.as_str()) {
            Some(s) => Some(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|_| CoreError::invalid_argument("due_date must be ISO-8601"))?
                    .with_timezone(&Utc),
            ),
            None => existing.due_date,
        };
        let now = Utc::now();

        sqlx::query(
            r#"UPDATE tasks SET title = ?, description = ?, status = ?, due_date = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(title)
        .bind(description)
        .bind(status)
        .bind(due_date.map(|d| d.to_rfc3339()))
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_task(id).await?.ok_or_else(|| CoreError::Internal("task vanished after update".to_string()))
    }

    pub async fn advance_recurring_task(&self, id: &str, next_date: DateTime<Utc>) -> Result<(), CoreError> {
        sqlx::query("UPDATE tasks SET next_date = ?, updated_at = ? WHERE id = ?")
            .bind(next_date.to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM tasks WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list_tasks(&self, user_id: &str, workspace: &str, filter: &ListFilter) -> Result<Page<Task>, CoreError> {
        let offset = filter.cursor.unwrap_or(0);
        let mut query = String::from("SELECT * FROM tasks WHERE user_id = ? AND workspace = ?");
        for (col, _) in &filter.equals {
            query.push_str(&format!(" AND {col} = ?"));
        }
        query.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&query).bind(user_id).bind(workspace);
        for (_, value) in &filter.equals {
            q = bind_value(q, value);
        }
        let rows = q.bind(filter.limit + 1).bind(offset).fetch_all(&self.pool).await?;

        let has_more = rows.len() as i64 > filter.limit;
        let items: Vec<Task> = rows.iter().take(filter.limit as usize).map(Self::row_to_task).collect();
        let next_cursor = if has_more { Some(offset + filter.limit) } else { None };
        Ok(Page { items, next_cursor })
    }

    /// Active recurring parent tasks whose `next_date` has passed (spec
    /// §4.5 "Recurring task expansion").
    pub async fn due_recurring_tasks(&self, as_of: DateTime<Utc>) -> Result<Vec<Task>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE is_recurring = 1 AND status != 'cancelled' AND next_date <= ?",
        )
        .bind(as_of.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_task).collect())
    }

    /// Idempotent by `(parent_id, next_date)` (spec §4.5): a second
    /// expansion call for the same pair is a no-op.
    pub async fn instance_exists(&self, parent_id: &str, next_date: DateTime<Utc>) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT id FROM tasks WHERE parent_task_id = ? AND due_date = ?")
            .bind(parent_id)
            .bind(next_date.to_rfc3339())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Task {
        let recurrence_rule: Option<String> = row.get("recurrence_rule");
        Task {
            id: row.get("id"),
            user_id: row.get("user_id"),
            workspace: row.get("workspace"),
            title: row.get("title"),
            description: row.get("description"),
            status: row.get("status"),
            due_date: parse_opt_ts(row.get::<Option<String>, _>("due_date")),
            is_recurring: row.get::<i64, _>("is_recurring") != 0,
            recurrence_rule: recurrence_rule.and_then(|s| serde_json::from_str(&s).ok()),
            parent_task_id: row.get("parent_task_id"),
            next_date: parse_opt_ts(row.get::<Option<String>, _>("next_date")),
            created_at: parse_ts(row.get::<String, _>("created_at")),
            updated_at: parse_ts(row.get::<String, _>("updated_at")),
        }
    }

    // ---- Reminder -------------------------------------------------------

    pub async fn create_reminder(
        &self,
        user_id: &str,
        workspace: &str,
        title: &str,
        remind_at: DateTime<Utc>,
    ) -> Result<Reminder, CoreError> {
        let id = Self::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO reminders (id, user_id, workspace, title, remind_at, done, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(workspace)
        .bind(title)
        .bind(remind_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_reminder(&id).await?.ok_or_else(|| CoreError::Internal("reminder not found after insert".to_string()))
    }

    pub async fn get_reminder(&self, id: &str) -> Result<Option<Reminder>, CoreError> {
        let row = sqlx::query("SELECT * FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::row_to_reminder(&r)))
    }

    pub async fn update_reminder(&self, id: &str, patch: &Value) -> Result<Reminder, CoreError> {
        let existing = self
            .get_reminder(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("reminder {id}")))?;
        let title = patch.get("title").and_then(|v| v.as_str()).unwrap_or(&existing.title);
        let remind_at = match patch.get("remind_at").and_then(|v| v.as_str()) {
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map_err(|_| CoreError::invalid_argument("remind_at must be ISO-8601"))?
                .with_timezone(&Utc),
            None => existing.remind_at,
        };
        let done = patch.get("done").and_then(|v| v.as_bool()).unwrap_or(existing.done);
        let now = Utc::now();

        sqlx::query("UPDATE reminders SET title = ?, remind_at = ?, done = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(remind_at.to_rfc3339())
            .bind(done as i64)
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_reminder(id).await?.ok_or_else(|| CoreError::Internal("reminder vanished after update".to_string()))
    }

    pub async fn delete_reminder(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM reminders WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list_reminders(&self, user_id: &str, workspace: &str, filter: &ListFilter) -> Result<Page<Reminder>, CoreError> {
        let offset = filter.cursor.unwrap_or(0);
        let mut query = String::from("SELECT * FROM reminders WHERE user_id = ? AND workspace = ?");
        for (col, _) in &filter.equals {
            query.push_str(&format!(" AND {col} = ?"));
        }
        query.push_str(" ORDER BY remind_at ASC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&query).bind(user_id).bind(workspace);
        for (_, value) in &filter.equals {
            q = bind_value(q, value);
        }
        let rows = q.bind(filter.limit + 1).bind(offset).fetch_all(&self.pool).await?;
        let has_more = rows.len() as i64 > filter.limit;
        let items = rows.iter().take(filter.limit as usize).map(Self::row_to_reminder).collect();
        let next_cursor = if has_more { Some(offset + filter.limit) } else { None };
        Ok(Page { items, next_cursor })
    }

    fn row_to_reminder(row: &sqlx::sqlite::SqliteRow) -> Reminder {
        Reminder {
            id: row.get("id"),
            user_id: row.get("user_id"),
            workspace: row.get("workspace"),
            title: row.get("title"),
            remind_at: parse_ts(row.get::<String, _>("remind_at")),
            done: row.get::<i64, _>("done") != 0,
            created_at: parse_ts(row.get::<String, _>("created_at")),
            updated_at: parse_ts(row.get::<String, _>("updated_at")),
        }
    }

    // ---- Event ----------------------------------------------------------

    pub async fn create_event(
        &self,
        user_id: &str,
        workspace: &str,
        title: &str,
        starts_at: DateTime<Utc>,
        ends_at: Option<DateTime<Utc>>,
        location: Option<&str>,
    ) -> Result<Event, CoreError> {
        let id = Self::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO events (id, user_id, workspace, title, starts_at, ends_at, location, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(workspace)
        .bind(title)
        .bind(starts_at.to_rfc3339())
        .bind(ends_at.map(|d| d.to_rfc3339()))
        .bind(location)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_event(&id).await?.ok_or_else(|| CoreError::Internal("event not found after insert".to_string()))
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>, CoreError> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::row_to_event(&r)))
    }

    pub async fn update_event(&self, id: &str, patch: &Value) -> Result<Event, CoreError> {
        let existing = self.get_event(id).await?.ok_or_else(|| CoreError::not_found(format!("event {id}")))?;
        let title = patch.get("title").and_then(|v| v.as_str()).unwrap_or(&existing.title);
        let starts_at = match patch.get("starts_at").and_then(|v| v.as_str()) {
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map_err(|_| CoreError::invalid_argument("starts_at must be ISO-8601"))?
                .with_timezone(&Utc),
            None => existing.starts_at,
        };
        let location = patch
            .get("location")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or(existing.location.clone());
        let now = Utc::now();

        sqlx::query("UPDATE events SET title = ?, starts_at = ?, location = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(starts_at.to_rfc3339())
            .bind(location)
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_event(id).await?.ok_or_else(|| CoreError::Internal("event vanished after update".to_string()))
    }

    pub async fn delete_event(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM events WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list_events(&self, user_id: &str, workspace: &str, filter: &ListFilter) -> Result<Page<Event>, CoreError> {
        let offset = filter.cursor.unwrap_or(0);
        let mut query = String::from("SELECT * FROM events WHERE user_id = ? AND workspace = ?");
        for (col, _) in &filter.equals {
            query.push_str(&format!(" AND {col} = ?"));
        }
        query.push_str(" ORDER BY starts_at ASC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&query).bind(user_id).bind(workspace);
        for (_, value) in &filter.equals {
            q = bind_value(q, value);
        }
        let rows = q.bind(filter.limit + 1).bind(offset).fetch_all(&self.pool).await?;
        let has_more = rows.len() as i64 > filter.limit;
        let items = rows.iter().take(filter.limit as usize).map(Self::row_to_event).collect();
        let next_cursor = if has_more { Some(offset + filter.limit) } else { None };
        Ok(Page { items, next_cursor })
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Event {
        Event {
            id: row.get("id"),
            user_id: row.get("user_id"),
            workspace: row.get("workspace"),
            title: row.get("title"),
            starts_at: parse_ts(row.get::<String, _>("starts_at")),
            ends_at: parse_opt_ts(row.get::<Option<String>, _>("ends_at")),
            location: row.get("location"),
            created_at: parse_ts(row.get::<String, _>("created_at")),
            updated_at: parse_ts(row.get::<String, _>("updated_at")),
        }
    }

    // ---- FoodEntry -------------------------------------------------------

    pub async fn create_food_entry(
        &self,
        user_id: &str,
        workspace: &str,
        name: &str,
        location: Option<&str>,
        preference: FoodPreference,
        consumed_at: DateTime<Utc>,
    ) -> Result<FoodEntry, CoreError> {
        let id = Self::new_id();
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO food_entries (id, user_id, workspace, name, location, preference,
                consumed_at, is_merged, merged_from, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 0, '[]', ?, ?)"#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(workspace)
        .bind(name)
        .bind(location)
        .bind(preference.as_str())
        .bind(consumed_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_food_entry(&id).await?.ok_or_else(|| CoreError::Internal("food entry not found after insert".to_string()))
    }

    pub async fn get_food_entry(&self, id: &str) -> Result<Option<FoodEntry>, CoreError> {
        let row = sqlx::query("SELECT * FROM food_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::row_to_food_entry(&r)))
    }

    pub async fn update_food_entry(&self, id: &str, patch: &Value) -> Result<FoodEntry, CoreError> {
        let existing = self
            .get_food_entry(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("food entry {id}")))?;
        let name = patch.get("name").and_then(|v| v.as_str()).unwrap_or(&existing.name);
        let preference = match patch.get("preference").and_then(|v| v.as_str()) {
            Some(s) => FoodPreference::parse(s)
                .ok_or_else(|| CoreError::invalid_argument("preference must be favorite|liked|neutral|disliked"))?
                .as_str()
                .to_string(),
            None => existing.preference.clone(),
        };
        let location = patch
            .get("location")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or(existing.location.clone());
        let now = Utc::now();

        sqlx::query("UPDATE food_entries SET name = ?, preference = ?, location = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(&preference)
            .bind(location)
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_food_entry(id).await?.ok_or_else(|| CoreError::Internal("food entry vanished after update".to_string()))
    }

    pub async fn delete_food_entry(&self, id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM food_entries WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list_food_entries(&self, user_id: &str, workspace: &str, filter: &ListFilter) -> Result<Page<FoodEntry>, CoreError> {
        let offset = filter.cursor.unwrap_or(0);
        let mut query = String::from("SELECT * FROM food_entries WHERE user_id = ? AND workspace = ?");
        for (col, _) in &filter.equals {
            query.push_str(&format!(" AND {col} = ?"));
        }
        query.push_str(" ORDER BY consumed_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&query).bind(user_id).bind(workspace);
        for (_, value) in &filter.equals {
            q = bind_value(q, value);
        }
        let rows = q.bind(filter.limit + 1).bind(offset).fetch_all(&self.pool).await?;
        let has_more = rows.len() as i64 > filter.limit;
        let items = rows.iter().take(filter.limit as usize).map(Self::row_to_food_entry).collect();
        let next_cursor = if has_more { Some(offset + filter.limit) } else { None };
        Ok(Page { items, next_cursor })
    }

    /// All non-merged entries for a user, for duplicate detection and the
    /// hybrid recommendation's structured pre-filter (spec §4.5).
    pub async fn all_active_food_entries(&self, user_id: &str, workspace: &str) -> Result<Vec<FoodEntry>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM food_entries WHERE user_id = ? AND workspace = ? AND is_merged = 0",
        )
        .bind(user_id)
        .bind(workspace)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_food_entry).collect())
    }

    /// Candidates matching `(rating in {positive-ish}) AND is_merged = 0
    /// AND consumed_at < now - recency_threshold`, ordered favorite >
    /// liked, then oldest `consumed_at` first (spec §4.5 hybrid food
    /// recommendation).
    pub async fn food_recommendation_candidates(
        &self,
        user_id: &str,
        workspace: &str,
        recency_threshold: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<FoodEntry>, CoreError> {
        let cutoff = Utc::now() - recency_threshold;
        let rows = sqlx::query(
            r#"SELECT * FROM food_entries
               WHERE user_id = ? AND workspace = ? AND is_merged = 0
                 AND preference IN ('favorite', 'liked') AND consumed_at < ?
               ORDER BY CASE preference WHEN 'favorite' THEN 0 ELSE 1 END, consumed_at ASC
               LIMIT ?"#,
        )
        .bind(user_id)
        .bind(workspace)
        .bind(cutoff.to_rfc3339())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::row_to_food_entry).collect())
    }

    /// Marks `merged_id` as merged into `canonical_id`, recording the
    /// merged-from id on the canonical entry (spec §4.5 duplicate
    /// detection: "Merging is a write that designates one entry canonical
    /// and marks the other is_merged = true, recording the merged-from
    /// id"). Transactional: both rows change together or neither does.
    pub async fn merge_food_entries(&self, canonical_id: &str, merged_id: &str) -> Result<FoodEntry, CoreError> {
        let mut tx = self.pool.begin().await?;

        let canonical_row = sqlx::query("SELECT merged_from FROM food_entries WHERE id = ?")
            .bind(canonical_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("food entry {canonical_id}")))?;
        let merged_from_raw: String = canonical_row.get("merged_from");
        let mut merged_from: Vec<String> = serde_json::from_str(&merged_from_raw).unwrap_or_default();
        if !merged_from.contains(&merged_id.to_string()) {
            merged_from.push(merged_id.to_string());
        }

        sqlx::query("UPDATE food_entries SET merged_from = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&merged_from)?)
            .bind(Utc::now().to_rfc3339())
            .bind(canonical_id)
            .execute(&mut *tx)
            .await?;

        let updated = sqlx::query(
            "UPDATE food_entries SET is_merged = 1, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(merged_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("food entry {merged_id}")))?;

        tx.commit().await?;
        let _ = updated;

        self.get_food_entry(canonical_id)
            .await?
            .ok_or_else(|| CoreError::Internal("canonical food entry vanished after merge".to_string()))
    }

    fn row_to_food_entry(row: &sqlx::sqlite::SqliteRow) -> FoodEntry {
        let merged_from: String = row.get("merged_from");
        FoodEntry {
            id: row.get("id"),
            user_id: row.get("user_id"),
            workspace: row.get("workspace"),
            name: row.get("name"),
            location: row.get("location"),
            preference: row.get("preference"),
            consumed_at: parse_ts(row.get::<String, _>("consumed_at")),
            is_merged: row.get::<i64, _>("is_merged") != 0,
            merged_from: serde_json::from_str(&merged_from).unwrap_or_default(),
            created_at: parse_ts(row.get::<String, _>("created_at")),
            updated_at: parse_ts(row.get::<String, _>("updated_at")),
        }
    }

    // ---- simple entities (note / document / memory / conversation) ----

    pub async fn create_simple(&self, table: &str, user_id: &str, workspace: &str, title: &str, content: &str) -> Result<EntityRow, CoreError> {
        validate_simple_table(table)?;
        let id = Self::new_id();
        let now = Utc::now();
        sqlx::query(&format!(
            "INSERT INTO {table} (id, user_id, workspace, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&id)
        .bind(user_id)
        .bind(workspace)
        .bind(title)
        .bind(content)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_simple(table, &id).await?.ok_or_else(|| CoreError::Internal("row not found after insert".to_string()))
    }

    pub async fn get_simple(&self, table: &str, id: &str) -> Result<Option<EntityRow>, CoreError> {
        validate_simple_table(table)?;
        let row = sqlx::query(&format!("SELECT * FROM {table} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::row_to_entity(&r)))
    }

    pub async fn update_simple(&self, table: &str, id: &str, patch: &Value) -> Result<EntityRow, CoreError> {
        validate_simple_table(table)?;
        let existing = self
            .get_simple(table, id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("{table} {id}")))?;
        let title = patch.get("title").and_then(|v| v.as_str()).unwrap_or(&existing.title);
        let content = patch.get("content").and_then(|v| v.as_str()).unwrap_or(&existing.content);
        let now = Utc::now();
        sqlx::query(&format!("UPDATE {table} SET title = ?, content = ?, updated_at = ? WHERE id = ?"))
            .bind(title)
            .bind(content)
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_simple(table, id).await?.ok_or_else(|| CoreError::Internal("row vanished after update".to_string()))
    }

    pub async fn delete_simple(&self, table: &str, id: &str) -> Result<(), CoreError> {
        validate_simple_table(table)?;
        sqlx::query(&format!("DELETE FROM {table} WHERE id = ?")).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list_simple(&self, table: &str, user_id: &str, workspace: &str, filter: &ListFilter) -> Result<Page<EntityRow>, CoreError> {
        validate_simple_table(table)?;
        let offset = filter.cursor.unwrap_or(0);
        let query = format!(
            "SELECT * FROM {table} WHERE user_id = ? AND workspace = ? ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(workspace)
            .bind(filter.limit + 1)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let has_more = rows.len() as i64 > filter.limit;
        let items = rows.iter().take(filter.limit as usize).map(Self::row_to_entity).collect();
        let next_cursor = if has_more { Some(offset + filter.limit) } else { None };
        Ok(Page { items, next_cursor })
    }

    fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> EntityRow {
        EntityRow {
            id: row.get("id"),
            user_id: row.get("user_id"),
            workspace: row.get("workspace"),
            title: row.get("title"),
            content: row.get("content"),
            created_at: parse_ts(row.get::<String, _>("created_at")),
            updated_at: parse_ts(row.get::<String, _>("updated_at")),
        }
    }
}

/// Allow-list for the dynamic table name used by the four simple
/// entities; this is the only place a table name is interpolated into
/// SQL, and only ever from this fixed set -- never from model-generated
/// arguments (spec §4.5.1: "closes off SQL injection from model-generated
/// arguments by construction").
fn validate_simple_table(table: &str) -> Result<(), CoreError> {
    match table {
        "notes" | "documents" | "memories" | "conversations" => Ok(()),
        other => Err(CoreError::Internal(format!("not a simple entity table: {other}"))),
    }
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc))
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        Value::String(s) => query.bind(s.as_str()),
        Value::Bool(b) => query.bind(*b as i64),
        Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap()),
        Value::Number(n) => query.bind(n.as_f64().unwrap_or(0.0)),
        _ => query.bind(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStructuredStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteStructuredStore::new(pool);
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_then_get_task_round_trips_id() {
        let store = store().await;
        let task = store
            .create_task("u1", "default", "buy salmon", None, None, false, None, None)
            .await
            .unwrap();
        let fetched = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(task.id, fetched.id);
    }

    #[tokio::test]
    async fn update_food_entry_changes_preference() {
        let store = store().await;
        let entry = store
            .create_food_entry("u1", "default", "salmon sashimi", Some("home"), FoodPreference::Favorite, Utc::now())
            .await
            .unwrap();
        let updated = store
            .update_food_entry(&entry.id, &serde_json::json!({"preference": "liked"}))
            .await
            .unwrap();
        assert_eq!(updated.preference, "liked");
    }

    #[tokio::test]
    async fn merge_food_entries_sets_is_merged_and_records_merged_from() {
        let store = store().await;
        let canonical = store
            .create_food_entry("u1", "default", "Pizza", None, FoodPreference::Liked, Utc::now())
            .await
            .unwrap();
        let dup = store
            .create_food_entry("u1", "default", "pizza", None, FoodPreference::Liked, Utc::now())
            .await
            .unwrap();

        let result = store.merge_food_entries(&canonical.id, &dup.id).await.unwrap();
        assert!(result.merged_from.contains(&dup.id));

        let merged = store.get_food_entry(&dup.id).await.unwrap().unwrap();
        assert!(merged.is_merged);
    }

    #[tokio::test]
    async fn list_tasks_paginates_with_cursor() {
        let store = store().await;
        for i in 0..5 {
            store
                .create_task("u1", "default", &format!("task {i}"), None, None, false, None, None)
                .await
                .unwrap();
        }
        let filter = ListFilter {
            equals: vec![],
            cursor: None,
            limit: 2,
        };
        let page1 = store.list_tasks("u1", "default", &filter).await.unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.next_cursor.is_some());

        let filter2 = ListFilter {
            cursor: page1.next_cursor,
            ..filter
        };
        let page2 = store.list_tasks("u1", "default", &filter2).await.unwrap();
        assert_eq!(page2.items.len(), 2);
    }
}
