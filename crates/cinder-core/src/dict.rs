//! Sharded concurrent map with an atomic size counter.
//!
//! Keys hash to one of N mutex-guarded shards (N a power of two, minimum
//! 16). The total entry count lives in an atomic so `len` never touches a
//! shard lock. Shard locks only protect map structure; logical atomicity
//! across keys is the job of the database's stripe lock table.
//!
//! Access to stored values is closure-based: values stay inside the shard
//! while a caller reads or mutates them, so large containers are never
//! cloned out.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use rand::Rng;

const MIN_SHARDS: usize = 16;

/// A sharded string-keyed concurrent map.
#[derive(Debug)]
pub struct ConcurrentDict<V> {
    shards: Vec<RwLock<HashMap<String, V>>>,
    count: AtomicUsize,
}

impl<V> ConcurrentDict<V> {
    /// Creates a dict with at least `shard_count` shards, rounded up to a
    /// power of two with a floor of 16.
    pub fn new(shard_count: usize) -> Self {
        let n = shard_count.max(MIN_SHARDS).next_power_of_two();
        let shards = (0..n).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards,
            count: AtomicUsize::new(0),
        }
    }

    fn shard_of(&self, key: &str) -> &RwLock<HashMap<String, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) & (self.shards.len() - 1);
        &self.shards[idx]
    }

    /// Applies `f` to the value for `key` under the shard read lock.
    pub fn get_with<R>(&self, key: &str, f: impl FnOnce(&V) -> R) -> Option<R> {
        let shard = self.shard_of(key).read().expect("shard poisoned");
        shard.get(key).map(f)
    }

    /// Applies `f` to the value for `key` under the shard write lock.
    pub fn update_with<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut shard = self.shard_of(key).write().expect("shard poisoned");
        shard.get_mut(key).map(f)
    }

    /// Inserts or replaces. Returns 1 if the key was new, 0 on replace.
    pub fn put(&self, key: String, value: V) -> usize {
        let mut shard = self.shard_of(&key).write().expect("shard poisoned");
        match shard.insert(key, value) {
            Some(_) => 0,
            None => {
                self.count.fetch_add(1, Ordering::Relaxed);
                1
            }
        }
    }

    /// Inserts only if the key is absent. Returns 1 on insert, 0 otherwise.
    pub fn put_if_absent(&self, key: String, value: V) -> usize {
        let mut shard = self.shard_of(&key).write().expect("shard poisoned");
        if shard.contains_key(&key) {
            return 0;
        }
        shard.insert(key, value);
        self.count.fetch_add(1, Ordering::Relaxed);
        1
    }

    /// Replaces only if the key exists. Returns 1 on replace, 0 otherwise.
    pub fn put_if_exists(&self, key: String, value: V) -> usize {
        let mut shard = self.shard_of(&key).write().expect("shard poisoned");
        match shard.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                1
            }
            None => 0,
        }
    }

    /// Removes a key, returning its value if it existed.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut shard = self.shard_of(key).write().expect("shard poisoned");
        let removed = shard.remove(key);
        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Returns `true` if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        let shard = self.shard_of(key).read().expect("shard poisoned");
        shard.contains_key(key)
    }

    /// Total entry count across all shards.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns `true` if the dict holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every entry under the owning shard's read lock.
    /// Returning `false` from the callback stops iteration.
    pub fn for_each(&self, mut f: impl FnMut(&str, &V) -> bool) {
        for lock in &self.shards {
            let shard = lock.read().expect("shard poisoned");
            for (key, value) in shard.iter() {
                if !f(key, value) {
                    return;
                }
            }
        }
    }

    /// Collects every key.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|key, _| {
            out.push(key.to_owned());
            true
        });
        out
    }

    /// Samples up to `limit` keys uniformly-ish at random. May contain
    /// duplicates. Returns fewer than `limit` only when the dict is empty.
    pub fn random_keys(&self, limit: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(limit);
        if self.is_empty() {
            return out;
        }
        while out.len() < limit {
            let lock = &self.shards[rng.gen_range(0..self.shards.len())];
            let shard = lock.read().expect("shard poisoned");
            if shard.is_empty() {
                continue;
            }
            let nth = rng.gen_range(0..shard.len());
            if let Some(key) = shard.keys().nth(nth) {
                out.push(key.clone());
            }
        }
        out
    }

    /// Samples up to `limit` distinct keys. Returns every key when the
    /// dict holds fewer than `limit`.
    pub fn random_distinct_keys(&self, limit: usize) -> Vec<String> {
        if self.len() <= limit {
            return self.keys();
        }
        let mut seen = std::collections::HashSet::with_capacity(limit);
        let mut rng = rand::thread_rng();
        while seen.len() < limit {
            let lock = &self.shards[rng.gen_range(0..self.shards.len())];
            let shard = lock.read().expect("shard poisoned");
            if shard.is_empty() {
                continue;
            }
            let nth = rng.gen_range(0..shard.len());
            if let Some(key) = shard.keys().nth(nth) {
                seen.insert(key.clone());
            }
        }
        seen.into_iter().collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        for lock in &self.shards {
            let mut shard = lock.write().expect("shard poisoned");
            shard.clear();
        }
        self.count.store(0, Ordering::Relaxed);
    }
}

impl<V: Clone> ConcurrentDict<V> {
    /// Returns a clone of the value for `key`.
    pub fn get_cloned(&self, key: &str) -> Option<V> {
        self.get_with(key, V::clone)
    }
}
