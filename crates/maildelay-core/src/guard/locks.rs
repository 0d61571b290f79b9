//! Per-key serialization of guard attempts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::addresslog::LogReason;

type Key = (String, LogReason);

/// Mutex for one key and the number of permits holding or awaiting it.
#[derive(Debug, Default)]
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

/// Table of async mutexes, one per `(email, reason)` currently in use.
///
/// Entries are dropped again once nobody holds or waits for them, including
/// waiters that were cancelled.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<Key, Slot>>,
}

impl KeyedLocks {
    /// Wait until the key is free and take it.
    pub(crate) async fn acquire(&self, email: &str, reason: LogReason) -> KeyPermit<'_> {
        let key = (email.to_string(), reason);
        let lock = {
            let mut slots = self.table();
            let slot = slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        // Registered before waiting, so a dropped future still unregisters.
        let mut permit = KeyPermit {
            locks: self,
            key,
            guard: None,
        };
        permit.guard = Some(lock.lock_owned().await);
        permit
    }

    /// Number of keys with a live mutex.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<Key, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hold on one key, exclusive once acquired. Released on drop.
pub(crate) struct KeyPermit<'a> {
    locks: &'a KeyedLocks,
    key: Key,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyPermit<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.locks.table();
        let idle = slots.get_mut(&self.key).is_some_and(|slot| {
            slot.users = slot.users.saturating_sub(1);
            slot.users == 0
        });
        if idle {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_key_waits() {
        let locks = Arc::new(KeyedLocks::default());
        let permit = locks.acquire("a@x.org", LogReason::SpamGuard).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _permit = locks.acquire("a@x.org", LogReason::SpamGuard).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap_or_else(|_| panic!("waiter never got the key"))
            .unwrap_or_else(|e| panic!("waiter panicked: {e}"));
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let locks = KeyedLocks::default();
        let _a = locks.acquire("a@x.org", LogReason::SpamGuard).await;
        let _b = locks.acquire("a@x.org", LogReason::NotRegistered).await;
        let _c = locks.acquire("b@x.org", LogReason::SpamGuard).await;
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_entry() {
        let locks = KeyedLocks::default();
        let permit = locks.acquire("a@x.org", LogReason::SpamGuard).await;

        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            locks.acquire("a@x.org", LogReason::SpamGuard),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(locks.len(), 1);

        drop(permit);
        assert_eq!(locks.len(), 0);

        let _again = locks.acquire("a@x.org", LogReason::SpamGuard).await;
        assert_eq!(locks.len(), 1);
    }
}
