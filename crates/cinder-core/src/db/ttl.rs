//! Key expiration: the TTL map and its timing-wheel eviction tasks.
//!
//! Every expiring key gets a cancellable wheel task under a stable name.
//! When the task fires it re-acquires the key's stripe write lock,
//! re-reads the TTL map (the deadline may have moved or been removed),
//! and evicts only if the key is still past due. Readers additionally
//! evict lazily when they trip over an expired key.

use std::sync::{Arc, Weak};

use tracing::debug;

use crate::db::Db;
use crate::time;
use crate::timewheel;

impl Db {
    /// Stable wheel-task name for a key's expiration. Includes the
    /// database index so equal key names in different databases don't
    /// cancel each other.
    pub(crate) fn expire_task_name(&self, key: &str) -> String {
        format!("expire:{}:{}", self.index(), key)
    }

    /// Sets an absolute expiry (ms since epoch) and registers the
    /// eviction task.
    pub fn expire_at(self: &Arc<Self>, key: &str, at_ms: u64) {
        self.ttl_map.put(key.to_owned(), at_ms);

        let weak: Weak<Db> = Arc::downgrade(self);
        let task_key = key.to_owned();
        timewheel::delay(time::until(at_ms), &self.expire_task_name(key), move || {
            let Some(db) = weak.upgrade() else { return };
            let _guard = db.locker.lock_key(&task_key);
            debug!(key = %task_key, db = db.index(), "expiration task fired");
            // the deadline may have been moved or removed while we waited
            let Some(at_ms) = db.ttl_map.get_cloned(&task_key) else {
                return;
            };
            if time::is_expired(at_ms) {
                db.remove(&task_key);
            }
        });
    }

    /// Clears the expiry for a key and cancels its eviction task.
    pub fn persist(&self, key: &str) {
        self.ttl_map.remove(key);
        timewheel::cancel(&self.expire_task_name(key));
    }

    /// Absolute expiry for a key (ms since epoch), if one is set.
    pub fn expire_time(&self, key: &str) -> Option<u64> {
        self.ttl_map.get_cloned(key)
    }

    /// Evicts `key` if its TTL has lapsed. Returns whether it was (or
    /// became) gone.
    pub(crate) fn evict_if_expired(self: &Arc<Self>, key: &str) -> bool {
        let Some(at_ms) = self.ttl_map.get_cloned(key) else {
            return false;
        };
        if time::is_expired(at_ms) {
            self.remove(key);
            return true;
        }
        false
    }
}
