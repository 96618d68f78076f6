//! One logical database: keyspace, TTLs, versions, and command execution.
//!
//! A `Db` owns its data dict, TTL map, version map, and striped lock
//! table. Commands flow through [`Db::exec`]: the registry supplies the
//! executor and the key extractor, the lock table serializes access per
//! stripe, and successful writes bump per-key versions and stream to the
//! AOF sink.

pub mod registry;
mod transaction;
mod ttl;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use cinder_protocol::{CmdLine, Frame};

use crate::dict::ConcurrentDict;
use crate::lock::LockTable;
use crate::types::quicklist::QuickList;
use crate::types::sorted_set::SortedSet;
use crate::types::DataEntity;

use registry::{lookup, validate_arity, AofExpireCtx};

const DATA_DICT_SHARDS: usize = 1 << 8;
const TTL_DICT_SHARDS: usize = 1 << 4;
const LOCK_STRIPES: usize = 1024;

/// The AOF sink: receives every committed write for one database.
pub type AofSink = Arc<dyn Fn(&[Bytes]) + Send + Sync>;

/// Per-connection transaction state: the MULTI flag, the queued command
/// lines, buffered queue-time errors, and the watched-version snapshot.
#[derive(Default)]
pub struct TxState {
    pub multi: bool,
    pub queue: Vec<CmdLine>,
    pub syntax_errs: Vec<Frame>,
    pub watching: HashMap<String, u32>,
}

impl TxState {
    /// Drops the MULTI flag, the queue, and buffered errors.
    pub fn reset_multi(&mut self) {
        self.multi = false;
        self.queue.clear();
        self.syntax_errs.clear();
    }

    /// Forgets every watched key.
    pub fn cancel_watching(&mut self) {
        self.watching.clear();
    }
}

/// A single logical database.
pub struct Db {
    index: usize,
    data: ConcurrentDict<DataEntity>,
    ttl_map: ConcurrentDict<u64>,
    version_map: ConcurrentDict<u32>,
    locker: LockTable,
    add_aof: RwLock<Option<AofSink>>,
    atomic_tx: bool,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("index", &self.index)
            .field("data", &self.data)
            .field("ttl_map", &self.ttl_map)
            .field("version_map", &self.version_map)
            .field("locker", &self.locker)
            .field("atomic_tx", &self.atomic_tx)
            .finish()
    }
}

impl Db {
    /// Creates an empty database with the given index.
    pub fn new(index: usize, atomic_tx: bool) -> Self {
        Self {
            index,
            data: ConcurrentDict::new(DATA_DICT_SHARDS),
            ttl_map: ConcurrentDict::new(TTL_DICT_SHARDS),
            version_map: ConcurrentDict::new(DATA_DICT_SHARDS),
            locker: LockTable::new(LOCK_STRIPES),
            add_aof: RwLock::new(None),
            atomic_tx,
        }
    }

    /// This database's numeric index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Installs the AOF sink. Until set, writes are not persisted.
    pub fn set_add_aof(&self, sink: AofSink) {
        *self.add_aof.write().expect("aof sink poisoned") = Some(sink);
    }

    /// Number of keys and number of keys carrying a TTL.
    pub fn sizes(&self) -> (usize, usize) {
        (self.data.len(), self.ttl_map.len())
    }

    // -----------------------------------------------------------------
    // command execution
    // -----------------------------------------------------------------

    /// Entry point for one command line against this database.
    ///
    /// Inside MULTI, the command is syntax-checked and queued (errors are
    /// buffered so a later EXEC aborts); otherwise it executes normally.
    pub fn exec(self: &Arc<Self>, tx: &mut TxState, cmdline: CmdLine) -> Frame {
        if tx.multi {
            if let Some(err) = check_syntax(&cmdline) {
                tx.syntax_errs.push(err.clone());
                return err;
            }
            if let Some(err) = check_multi_support(&cmdline) {
                tx.syntax_errs.push(err.clone());
                return err;
            }
            tx.queue.push(cmdline);
            return Frame::queued();
        }
        self.exec_normal(&cmdline)
    }

    /// Executes one command line with full locking, version accounting,
    /// and AOF emission.
    pub fn exec_normal(self: &Arc<Self>, cmdline: &[Bytes]) -> Frame {
        if let Some(err) = check_syntax(cmdline) {
            return err;
        }

        let name = String::from_utf8_lossy(&cmdline[0]).to_lowercase();
        let spec = lookup(&name).expect("checked by check_syntax");

        let prepare = spec.prepare.expect("registry commands carry extractors");
        let (write_keys, read_keys) = prepare(&cmdline[1..]);
        let _guard = self.locker.rw_locks(&write_keys, &read_keys);

        let (reply, aof_ctx) = (spec.executor)(self, &cmdline[1..]);
        self.after_exec(&reply, aof_ctx, cmdline);
        if !spec.is_read_only() && !reply.is_error() {
            self.add_version(&write_keys);
        }
        reply
    }

    /// Executes a command assuming the caller already holds every needed
    /// stripe lock (EXEC bodies and undo-log replay). No version bump.
    pub(crate) fn exec_with_lock(self: &Arc<Self>, cmdline: &[Bytes]) -> Frame {
        if let Some(err) = check_syntax(cmdline) {
            return err;
        }
        let name = String::from_utf8_lossy(&cmdline[0]).to_lowercase();
        let spec = lookup(&name).expect("checked by check_syntax");
        let (reply, aof_ctx) = (spec.executor)(self, &cmdline[1..]);
        self.after_exec(&reply, aof_ctx, cmdline);
        reply
    }

    /// Streams a committed write (and any derived expiry) to the AOF sink.
    fn after_exec(&self, reply: &Frame, aof_ctx: Option<AofExpireCtx>, cmdline: &[Bytes]) {
        let Some(ctx) = aof_ctx else { return };
        if !ctx.need_aof || reply.is_error() {
            return;
        }
        let sink = self.add_aof.read().expect("aof sink poisoned");
        let Some(sink) = sink.as_ref() else { return };
        sink(cmdline);
        if let Some(at_ms) = ctx.expire_at {
            let key = registry::key_str(&cmdline[1]);
            sink(&crate::marshal::expire_to_cmdline(&key, at_ms));
        }
    }

    // -----------------------------------------------------------------
    // versions
    // -----------------------------------------------------------------

    /// Current version counter for a key (0 if never written).
    pub fn get_version(&self, key: &str) -> u32 {
        self.version_map.get_cloned(key).unwrap_or(0)
    }

    /// Bumps the version counter of every given key.
    pub fn add_version(&self, keys: &[String]) {
        for key in keys {
            if self
                .version_map
                .update_with(key, |v| *v = v.wrapping_add(1))
                .is_none()
            {
                self.version_map.put(key.clone(), 1);
            }
        }
    }

    // -----------------------------------------------------------------
    // entity access (expiry-aware)
    // -----------------------------------------------------------------

    /// Applies `f` to the live entity under `key`, evicting it first if
    /// its TTL has lapsed.
    pub fn get_entity_with<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&DataEntity) -> R,
    ) -> Option<R> {
        if !self.data.contains_key(key) {
            return None;
        }
        if self.evict_if_expired(key) {
            return None;
        }
        self.data.get_with(key, f)
    }

    /// Returns whether the key currently exists (evicting it if expired).
    pub fn contains_key(self: &Arc<Self>, key: &str) -> bool {
        self.data.contains_key(key) && !self.evict_if_expired(key)
    }

    /// Mutates the live entity under `key` in place.
    pub fn update_entity_with<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&mut DataEntity) -> R,
    ) -> Option<R> {
        if !self.contains_key(key) {
            return None;
        }
        self.data.update_with(key, f)
    }

    /// Inserts or replaces an entity. Returns 1 if the key was new.
    pub fn put_entity(&self, key: String, entity: DataEntity) -> usize {
        self.data.put(key, entity)
    }

    /// Removes a key, its TTL, and its pending expiration task.
    pub fn remove(&self, key: &str) {
        self.data.remove(key);
        self.ttl_map.remove(key);
        crate::timewheel::cancel(&self.expire_task_name(key));
    }

    /// Removes every key, TTL, and version from this database.
    pub fn flush(&self) {
        for key in self.ttl_map.keys() {
            crate::timewheel::cancel(&self.expire_task_name(&key));
        }
        self.data.clear();
        self.ttl_map.clear();
        self.version_map.clear();
    }

    /// Visits every live entity with its optional expiry (ms since epoch).
    pub fn for_each_entity(&self, mut f: impl FnMut(&str, &DataEntity, Option<u64>) -> bool) {
        self.data.for_each(|key, entity| {
            let expire_at = self.ttl_map.get_cloned(key);
            f(key, entity, expire_at)
        });
    }

    // -----------------------------------------------------------------
    // typed accessors used by the command implementations
    // -----------------------------------------------------------------

    /// Runs `f` on the hash at `key`, or on a fresh hash stored there.
    /// Fails with `Err(())` when the key holds another type.
    pub fn with_hash_or_init<R>(
        self: &Arc<Self>,
        key: &str,
        mut f: impl FnMut(&mut HashMap<String, Bytes>) -> R,
    ) -> Result<R, ()> {
        let existing = self.update_entity_with(key, |entity| match entity {
            DataEntity::Hash(hash) => Ok(f(hash)),
            _ => Err(()),
        });
        match existing {
            Some(result) => result.map_err(|_| ()),
            None => {
                let mut hash = HashMap::new();
                let result = f(&mut hash);
                self.put_entity(key.to_owned(), DataEntity::Hash(hash));
                Ok(result)
            }
        }
    }

    /// Runs `f` on the hash at `key` if present; `Ok(None)` when absent.
    pub fn with_hash<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&HashMap<String, Bytes>) -> R,
    ) -> Result<Option<R>, ()> {
        match self.get_entity_with(key, |entity| match entity {
            DataEntity::Hash(hash) => Ok(f(hash)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Mutable variant of [`Db::with_hash`].
    pub fn with_hash_mut<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Bytes>) -> R,
    ) -> Result<Option<R>, ()> {
        match self.update_entity_with(key, |entity| match entity {
            DataEntity::Hash(hash) => Ok(f(hash)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Runs `f` on the list at `key`, or on a fresh list stored there.
    pub fn with_list_or_init<R>(
        self: &Arc<Self>,
        key: &str,
        mut f: impl FnMut(&mut QuickList) -> R,
    ) -> Result<R, ()> {
        let existing = self.update_entity_with(key, |entity| match entity {
            DataEntity::List(list) => Ok(f(list)),
            _ => Err(()),
        });
        match existing {
            Some(result) => result.map_err(|_| ()),
            None => {
                let mut list = QuickList::new();
                let result = f(&mut list);
                self.put_entity(key.to_owned(), DataEntity::List(list));
                Ok(result)
            }
        }
    }

    /// Runs `f` on the list at `key` if present; `Ok(None)` when absent.
    pub fn with_list<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&QuickList) -> R,
    ) -> Result<Option<R>, ()> {
        match self.get_entity_with(key, |entity| match entity {
            DataEntity::List(list) => Ok(f(list)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Mutable variant of [`Db::with_list`].
    pub fn with_list_mut<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&mut QuickList) -> R,
    ) -> Result<Option<R>, ()> {
        match self.update_entity_with(key, |entity| match entity {
            DataEntity::List(list) => Ok(f(list)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Runs `f` on the set at `key`, or on a fresh set stored there.
    pub fn with_set_or_init<R>(
        self: &Arc<Self>,
        key: &str,
        mut f: impl FnMut(&mut std::collections::HashSet<String>) -> R,
    ) -> Result<R, ()> {
        let existing = self.update_entity_with(key, |entity| match entity {
            DataEntity::Set(set) => Ok(f(set)),
            _ => Err(()),
        });
        match existing {
            Some(result) => result.map_err(|_| ()),
            None => {
                let mut set = std::collections::HashSet::new();
                let result = f(&mut set);
                self.put_entity(key.to_owned(), DataEntity::Set(set));
                Ok(result)
            }
        }
    }

    /// Runs `f` on the set at `key` if present; `Ok(None)` when absent.
    pub fn with_set<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&std::collections::HashSet<String>) -> R,
    ) -> Result<Option<R>, ()> {
        match self.get_entity_with(key, |entity| match entity {
            DataEntity::Set(set) => Ok(f(set)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Mutable variant of [`Db::with_set`].
    pub fn with_set_mut<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&mut std::collections::HashSet<String>) -> R,
    ) -> Result<Option<R>, ()> {
        match self.update_entity_with(key, |entity| match entity {
            DataEntity::Set(set) => Ok(f(set)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Runs `f` on the sorted set at `key`, or on a fresh one stored there.
    pub fn with_zset_or_init<R>(
        self: &Arc<Self>,
        key: &str,
        mut f: impl FnMut(&mut SortedSet) -> R,
    ) -> Result<R, ()> {
        let existing = self.update_entity_with(key, |entity| match entity {
            DataEntity::SortedSet(zset) => Ok(f(zset)),
            _ => Err(()),
        });
        match existing {
            Some(result) => result.map_err(|_| ()),
            None => {
                let mut zset = SortedSet::new();
                let result = f(&mut zset);
                self.put_entity(key.to_owned(), DataEntity::SortedSet(zset));
                Ok(result)
            }
        }
    }

    /// Runs `f` on the sorted set at `key` if present; `Ok(None)` when
    /// absent.
    pub fn with_zset<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&SortedSet) -> R,
    ) -> Result<Option<R>, ()> {
        match self.get_entity_with(key, |entity| match entity {
            DataEntity::SortedSet(zset) => Ok(f(zset)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Mutable variant of [`Db::with_zset`].
    pub fn with_zset_mut<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&mut SortedSet) -> R,
    ) -> Result<Option<R>, ()> {
        match self.update_entity_with(key, |entity| match entity {
            DataEntity::SortedSet(zset) => Ok(f(zset)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }

    /// Runs `f` on the string at `key` if present; `Ok(None)` when absent.
    pub fn with_string<R>(
        self: &Arc<Self>,
        key: &str,
        f: impl FnOnce(&Bytes) -> R,
    ) -> Result<Option<R>, ()> {
        match self.get_entity_with(key, |entity| match entity {
            DataEntity::Bytes(raw) => Ok(f(raw)),
            _ => Err(()),
        }) {
            None => Ok(None),
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(())) => Err(()),
        }
    }
}

/// Validates a command line against the registry: known verb, legal arity.
pub fn check_syntax(cmdline: &[Bytes]) -> Option<Frame> {
    let name = String::from_utf8_lossy(&cmdline[0]).to_lowercase();
    let Some(spec) = lookup(&name) else {
        return Some(Frame::err(format!("ERR unknown command '{name}'")));
    };
    if !validate_arity(spec.arity, cmdline.len()) {
        return Some(Frame::arg_num_err(&name));
    }
    None
}

/// Rejects commands without a key extractor from running inside MULTI.
fn check_multi_support(cmdline: &[Bytes]) -> Option<Frame> {
    let name = String::from_utf8_lossy(&cmdline[0]).to_lowercase();
    let spec = lookup(&name)?;
    if spec.prepare.is_none() {
        return Some(Frame::err(format!(
            "ERR command '{name}' cannot be used in MULTI"
        )));
    }
    None
}
