//! Session store — per-user diagnosis state plus per-user serialization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::diagnosis::Session;

/// Narrow storage interface for sessions, keyed by transport user id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Option<Session>;

    /// Store `session`, fully replacing any previous one.
    async fn put(&self, user_id: &str, session: Session);

    async fn delete(&self, user_id: &str);
}

/// Process-lifetime session map.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.read().await.get(user_id).cloned()
    }

    async fn put(&self, user_id: &str, session: Session) {
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), session);
    }

    async fn delete(&self, user_id: &str) {
        self.sessions.write().await.remove(user_id);
    }
}

/// Hands out one async mutex per user id so read-modify-write cycles on the
/// same session never interleave.
#[derive(Default)]
pub struct UserLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held while a user's event is processed.
pub struct UserGuard {
    _guard: OwnedMutexGuard<()>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`.
    pub async fn acquire(&self, user_id: &str) -> UserGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };
        UserGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of users with an active or pending guard.
    #[cfg(test)]
    fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|l| Arc::strong_count(l) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::diagnosis::Phase;

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemorySessionStore::new();
        assert!(store.get("U1").await.is_none());

        let mut session = Session::new(Phase::Choice { step: 0 });
        store.put("U1", session.clone()).await;
        assert_eq!(store.get("U1").await, Some(session.clone()));

        session.choice_score = 4;
        session.phase = Phase::Choice { step: 1 };
        store.put("U1", session.clone()).await;
        assert_eq!(store.get("U1").await.unwrap().choice_score, 4);
        assert_eq!(store.len().await, 1);

        store.delete("U1").await;
        assert!(store.get("U1").await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = InMemorySessionStore::new();
        store.put("U1", Session::new(Phase::Choice { step: 2 })).await;
        store.put("U2", Session::new(Phase::FreeText { step: 0 })).await;
        store.delete("U1").await;
        assert_eq!(
            store.get("U2").await.unwrap().phase,
            Phase::FreeText { step: 0 }
        );
    }

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let first = locks.acquire("U1").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("U1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second acquire should proceed")
            .unwrap();
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.acquire("U1").await;
        tokio::time::timeout(Duration::from_secs(1), locks.acquire("U2"))
            .await
            .expect("other users must not wait");
        assert_eq!(locks.active(), 1);
    }

    #[tokio::test]
    async fn idle_locks_are_dropped() {
        let locks = UserLocks::new();
        drop(locks.acquire("U1").await);
        drop(locks.acquire("U2").await);
        assert_eq!(locks.active(), 0);
        let _c = locks.acquire("U3").await;
        assert_eq!(locks.locks.lock().unwrap().len(), 1);
    }
}
