//! Striped lock table for per-key mutual exclusion.
//!
//! A fixed array of read/write locks; each key hashes (FNV-32) to one
//! stripe. Multi-key operations collect the stripes of every involved
//! key, deduplicate, and acquire them in ascending stripe order, the
//! canonical ordering that makes concurrent overlapping acquisitions
//! deadlock-free. Guards release in reverse acquisition order.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const FNV32_BASIS: u32 = 2_166_136_261;
const FNV32_PRIME: u32 = 16_777_619;

fn fnv32(key: &str) -> u32 {
    let mut hash = FNV32_BASIS;
    for &b in key.as_bytes() {
        hash = hash.wrapping_mul(FNV32_PRIME);
        hash ^= u32::from(b);
    }
    hash
}

/// A table of lock stripes shared by all keys of one database.
#[derive(Debug)]
pub struct LockTable {
    stripes: Vec<RwLock<()>>,
}

/// One acquired stripe, in the mode the lock plan assigned it.
enum StripeGuard<'a> {
    Read(#[allow(dead_code)] RwLockReadGuard<'a, ()>),
    Write(#[allow(dead_code)] RwLockWriteGuard<'a, ()>),
}

/// RAII guard over a set of stripes. Dropping releases the stripes in
/// reverse acquisition order.
pub struct StripeGuards<'a> {
    guards: Vec<StripeGuard<'a>>,
}

impl Drop for StripeGuards<'_> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

impl LockTable {
    /// Creates a table with at least `size` stripes, rounded up to a
    /// power of two so stripe selection is a mask.
    pub fn new(size: usize) -> Self {
        let size = size.max(1).next_power_of_two();
        let stripes = (0..size).map(|_| RwLock::new(())).collect();
        Self { stripes }
    }

    fn stripe_of(&self, key: &str) -> usize {
        (fnv32(key) as usize) & (self.stripes.len() - 1)
    }

    /// Acquires the stripes covering `write_keys` in write mode and those
    /// covering only `read_keys` in read mode.
    ///
    /// Stripes are deduplicated and locked in ascending index order; a
    /// stripe that covers both a write key and a read key is taken in
    /// write mode. The returned guard holds every stripe until dropped.
    pub fn rw_locks<'a, W, R>(&'a self, write_keys: W, read_keys: R) -> StripeGuards<'a>
    where
        W: IntoIterator,
        W::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        // stripe index -> needs write mode
        let mut plan: BTreeMap<usize, bool> = BTreeMap::new();
        for key in read_keys {
            plan.entry(self.stripe_of(key.as_ref())).or_insert(false);
        }
        for key in write_keys {
            *plan.entry(self.stripe_of(key.as_ref())).or_insert(true) = true;
        }

        let mut guards = Vec::with_capacity(plan.len());
        for (stripe, write) in plan {
            let lock = &self.stripes[stripe];
            if write {
                guards.push(StripeGuard::Write(lock.write().expect("stripe poisoned")));
            } else {
                guards.push(StripeGuard::Read(lock.read().expect("stripe poisoned")));
            }
        }
        StripeGuards { guards }
    }

    /// Acquires the single stripe covering `key` in write mode.
    pub fn lock_key<'a>(&'a self, key: &str) -> StripeGuards<'a> {
        self.rw_locks([key], std::iter::empty::<&str>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn size_rounds_to_power_of_two() {
        assert_eq!(LockTable::new(1000).stripes.len(), 1024);
        assert_eq!(LockTable::new(1024).stripes.len(), 1024);
        assert_eq!(LockTable::new(0).stripes.len(), 1);
    }

    #[test]
    fn same_key_same_stripe() {
        let table = LockTable::new(1024);
        assert_eq!(table.stripe_of("alpha"), table.stripe_of("alpha"));
    }

    #[test]
    fn read_locks_are_shared() {
        let table = LockTable::new(16);
        let a = table.rw_locks(std::iter::empty::<&str>(), ["k"]);
        let b = table.rw_locks(std::iter::empty::<&str>(), ["k"]);
        drop(a);
        drop(b);
    }

    #[test]
    fn duplicate_keys_do_not_self_deadlock() {
        let table = LockTable::new(16);
        // both keys may share a stripe; the plan must dedup
        let guard = table.rw_locks(["a", "a", "b"], ["a", "b", "c"]);
        drop(guard);
    }

    #[test]
    fn overlapping_write_sets_never_deadlock() {
        let table = Arc::new(LockTable::new(64));
        let keys: Vec<String> = (0..32).map(|i| format!("key:{i}")).collect();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = Arc::clone(&table);
            let keys = keys.clone();
            handles.push(thread::spawn(move || {
                use rand::seq::SliceRandom;
                use rand::Rng;
                let mut rng = rand::thread_rng();
                for _ in 0..500 {
                    let mut picked = keys.clone();
                    picked.shuffle(&mut rng);
                    let n = rng.gen_range(1..8);
                    let write: Vec<_> = picked[..n].to_vec();
                    let read: Vec<_> = picked[n..n + 4].to_vec();
                    let guard = table.rw_locks(&write, &read);
                    drop(guard);
                }
            }));
        }
        for h in handles {
            h.join().expect("locking thread panicked");
        }
    }

    #[test]
    fn fnv32_matches_reference_vectors() {
        // reference values for the 32-bit FNV-1 hash
        assert_eq!(fnv32(""), 2_166_136_261);
        assert_eq!(fnv32("a"), 0x050c_5d7e);
        assert_eq!(fnv32("foobar"), 0x31f0_b262);
    }
}
