// src/session/store.rs
// The `SessionStore` capability (spec §4.1, §9 "replacing ad-hoc global
// state"): `load`/`save`/`clear` over a `Session`, with an in-memory
// implementation for tests/dev and a sqlite-backed implementation for
// durable single-user deployments. Grounded on the teacher's
// `SessionCacheStore` upsert pattern (examples/ConaryLabs-Mira/backend/src/cache/session_state_store.rs)
// generalized from cache-state rows to whole-session JSON blobs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;

use crate::error::CoreError;

use super::types::{Session, SessionSummary};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the existing session for `session_id`, or a freshly created
    /// empty one if none exists yet (spec §4.1 `load`).
    async fn load(&self, session_id: &str, user_id: &str, workspace: &str) -> Result<Session, CoreError>;

    /// Persists the given session, overwriting any prior state for its id
    /// (spec §4.1 `save`). Callers are expected to have already pruned
    /// `session.messages` before calling this.
    async fn save(&self, session: &Session) -> Result<(), CoreError>;

    /// Removes all persisted state for `session_id` (spec §6.3 `clear`).
    /// Idempotent: clearing an unknown session is not an error.
    async fn clear(&self, session_id: &str) -> Result<(), CoreError>;

    /// Lightweight metadata without full message content (spec §6.3
    /// `describe`). Returns `None` if the session has never been saved.
    async fn describe(&self, session_id: &str) -> Result<Option<SessionSummary>, CoreError>;
}

/// Development/test-only store: an in-process map guarded by a single
/// `RwLock`. Per-session serialization of *turns* is handled separately by
/// `SessionLocks` (spec §5); this lock only protects the map itself.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str, user_id: &str, workspace: &str) -> Result<Session, CoreError> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(session) => Ok(session.clone()),
            None => Ok(Session::new(session_id, user_id, workspace)),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), CoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), CoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn describe(&self, session_id: &str) -> Result<Option<SessionSummary>, CoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(SessionSummary::from))
    }
}

/// Durable single-process store backed by SQLite (spec §4.1: "durable
/// enough to survive process restart for personal-use deployments"). The
/// whole `Session` is serialized to a single JSON column, upserted by
/// primary key, mirroring the teacher's `SessionCacheStore::upsert` shape.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the backing table if it doesn't exist yet. Called once at
    /// startup by the binary that owns the pool.
    pub async fn ensure_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS core_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                workspace TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str, user_id: &str, workspace: &str) -> Result<Session, CoreError> {
        let row = sqlx::query("SELECT body FROM core_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                let session: Session = serde_json::from_str(&body)?;
                Ok(session)
            }
            None => Ok(Session::new(session_id, user_id, workspace)),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), CoreError> {
        let body = serde_json::to_string(session)?;
        sqlx::query(
            r#"
            INSERT INTO core_sessions (session_id, user_id, workspace, body, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                user_id = excluded.user_id,
                workspace = excluded.workspace,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(&session.workspace)
        .bind(&body)
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM core_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn describe(&self, session_id: &str) -> Result<Option<SessionSummary>, CoreError> {
        let row = sqlx::query("SELECT body FROM core_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                let session: Session = serde_json::from_str(&body)?;
                Ok(Some(SessionSummary::from(&session)))
            }
            None => Ok(None),
        }
    }
}

/// Shared handle type passed around the turn pipeline; `Arc<dyn
/// SessionStore>` so `turn.rs` can hold it alongside the other capabilities
/// without being generic over the concrete store.
pub type SharedSessionStore = Arc<dyn SessionStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips() {
        let store = InMemorySessionStore::new();
        let mut session = store.load("s1", "u1", "default").await.unwrap();
        assert!(session.messages.is_empty());

        session.messages.push(super::super::types::Message::user("hi"));
        store.save(&session).await.unwrap();

        let reloaded = store.load("s1", "u1", "default").await.unwrap();
        assert_eq!(reloaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn clear_then_describe_is_none() {
        let store = InMemorySessionStore::new();
        let session = store.load("s2", "u1", "default").await.unwrap();
        store.save(&session).await.unwrap();
        store.clear("s2").await.unwrap();
        assert!(store.describe("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_round_trips() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteSessionStore::new(pool);
        store.ensure_schema().await.unwrap();

        let mut session = store.load("s3", "u1", "default").await.unwrap();
        session.current_expert = Some("food".to_string());
        store.save(&session).await.unwrap();

        let reloaded = store.load("s3", "u1", "default").await.unwrap();
        assert_eq!(reloaded.current_expert.as_deref(), Some("food"));

        let summary = store.describe("s3").await.unwrap().unwrap();
        assert_eq!(summary.current_expert.as_deref(), Some("food"));
    }
}
