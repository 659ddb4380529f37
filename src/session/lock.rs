// src/session/lock.rs
// Per-session keyed async mutex (spec §5: "turns for the same session_id
// are serialized"). Grounded on the dashmap-backed keyed-lock pattern used
// across the example pack for per-entity serialization; the teacher itself
// relies on SQLite row semantics, so this is enrichment from the broader
// pack rather than a direct port.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::runtime::BusySessionPolicy;
use crate::error::CoreError;

#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held for the duration of one turn; dropping it releases the per-session
/// lock for the next waiter.
pub struct SessionGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn entry(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for `session_id` according to the configured busy
    /// policy: `Wait` blocks up to `busy_wait_cap_seconds` before returning
    /// `ErrorKind::Busy`; `Reject` fails immediately if already held.
    pub async fn acquire(
        &self,
        session_id: &str,
        policy: BusySessionPolicy,
        wait_cap: Duration,
    ) -> Result<SessionGuard, CoreError> {
        let mutex = self.entry(session_id);

        match policy {
            BusySessionPolicy::Reject => match mutex.try_lock_owned() {
                Ok(permit) => Ok(SessionGuard { _permit: permit }),
                Err(_) => Err(CoreError::Busy),
            },
            BusySessionPolicy::Wait => match timeout(wait_cap, mutex.lock_owned()).await {
                Ok(permit) => Ok(SessionGuard { _permit: permit }),
                Err(_) => Err(CoreError::Busy),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_turn_waits_then_proceeds() {
        let locks = Arc::new(SessionLocks::new());
        let first = locks
            .acquire("s1", BusySessionPolicy::Wait, Duration::from_secs(1))
            .await
            .unwrap();

        let locks2 = locks.clone();
        let handle = tokio::spawn(async move {
            locks2
                .acquire("s1", BusySessionPolicy::Wait, Duration::from_secs(1))
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first);

        let second = handle.await.unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn reject_policy_fails_fast_when_busy() {
        let locks = Arc::new(SessionLocks::new());
        let _first = locks
            .acquire("s2", BusySessionPolicy::Reject, Duration::from_secs(1))
            .await
            .unwrap();

        let err = locks
            .acquire("s2", BusySessionPolicy::Reject, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Busy);
    }
}
