//! Per-(owner, account kind) serialization of lifecycle transitions.
//!
//! Within one process, every operation that reads and then writes an owner's
//! subscriptions holds that owner's lock. Across processes the repository's
//! version compare-and-set catches what the lock cannot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::subscription::SubscriptionKey;

/// Held for the duration of one transition.
pub type OwnerGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<SubscriptionKey, Arc<AsyncMutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `key`.
    pub async fn lock(&self, key: &SubscriptionKey) -> OwnerGuard {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        entry.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
