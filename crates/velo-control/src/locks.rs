//! Per-user serialization of rental mutations.
//!
//! Every code path that issues remote calls for a user's rental (start,
//! supervised termination) holds that user's lock for its whole run. Users
//! never contend with each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use velo_core::UserId;

/// Table of per-user async mutexes.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of a user.
    ///
    /// The lock is released when the guard is dropped.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries nobody holds or waits on are dropped.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Returns true if someone holds or waits on the user's lock.
    #[cfg(test)]
    fn is_contended(&self, user_id: UserId) -> bool {
        self.locks
            .lock()
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let user = UserId::new(1);

        let guard = locks.acquire(user).await;
        assert!(locks.is_contended(user));

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(user).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_users_do_not_contend() {
        let locks = UserLocks::new();
        let _first = locks.acquire(UserId::new(1)).await;
        let _second = locks.acquire(UserId::new(2)).await;
        assert!(locks.is_contended(UserId::new(1)));
        assert!(locks.is_contended(UserId::new(2)));
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = UserLocks::new();
        drop(locks.acquire(UserId::new(1)).await);
        let _other = locks.acquire(UserId::new(2)).await;
        assert!(!locks.is_contended(UserId::new(1)));
        assert_eq!(locks.locks.lock().len(), 1);
    }
}
