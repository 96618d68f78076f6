//! Command registry: name → executor, key extractor, arity, flags.
//!
//! The table is built once at startup. Arity follows the classic
//! convention: a positive value means exactly that many tokens
//! (verb included); a negative value means at least `-arity` tokens.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use cinder_protocol::Frame;

use crate::commands;
use crate::db::Db;

/// Tells the dispatcher what a finished write must persist: whether the
/// verbatim command goes to the AOF, and the absolute expiry (ms since
/// epoch) to emit as a derived `PEXPIREAT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AofExpireCtx {
    pub need_aof: bool,
    pub expire_at: Option<u64>,
}

impl AofExpireCtx {
    /// Persist the command itself, no TTL attached.
    pub fn aof() -> Option<Self> {
        Some(Self {
            need_aof: true,
            expire_at: None,
        })
    }

    /// Persist the command and a derived `PEXPIREAT`.
    pub fn aof_with_expire(at_ms: u64) -> Option<Self> {
        Some(Self {
            need_aof: true,
            expire_at: Some(at_ms),
        })
    }
}

/// A command executor. `args` excludes the verb.
pub type ExecFn = fn(&Arc<Db>, &[Bytes]) -> (Frame, Option<AofExpireCtx>);

/// Returns the (write keys, read keys) a command invocation touches.
pub type PrepareFn = fn(&[Bytes]) -> (Vec<String>, Vec<String>);

/// Whether a command mutates the keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlags {
    Write,
    ReadOnly,
}

/// One registry entry.
pub struct CommandSpec {
    pub executor: ExecFn,
    /// Key extractor; commands without one cannot run inside MULTI.
    pub prepare: Option<PrepareFn>,
    pub arity: i32,
    pub flags: CommandFlags,
}

impl CommandSpec {
    pub fn is_read_only(&self) -> bool {
        self.flags == CommandFlags::ReadOnly
    }
}

/// Key extractor for commands whose first argument is their only,
/// written, key.
pub fn write_first_key(args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    (vec![key_str(&args[0])], Vec::new())
}

/// Key extractor for commands whose first argument is their only,
/// read, key.
pub fn read_first_key(args: &[Bytes]) -> (Vec<String>, Vec<String>) {
    (Vec::new(), vec![key_str(&args[0])])
}

/// Decodes a key token; keys are treated as (lossy) UTF-8 strings.
pub fn key_str(raw: &Bytes) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Validates a token count against a registry arity.
pub fn validate_arity(arity: i32, token_count: usize) -> bool {
    if arity >= 0 {
        token_count == arity as usize
    } else {
        token_count >= (-arity) as usize
    }
}

/// Looks up a command by its already-lowercased name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    registry().get(name)
}

fn registry() -> &'static HashMap<&'static str, CommandSpec> {
    static REGISTRY: OnceLock<HashMap<&'static str, CommandSpec>> = OnceLock::new();
    REGISTRY.get_or_init(build)
}

fn entry(
    table: &mut HashMap<&'static str, CommandSpec>,
    name: &'static str,
    executor: ExecFn,
    prepare: PrepareFn,
    arity: i32,
    flags: CommandFlags,
) {
    table.insert(
        name,
        CommandSpec {
            executor,
            prepare: Some(prepare),
            arity,
            flags,
        },
    );
}

fn build() -> HashMap<&'static str, CommandSpec> {
    use CommandFlags::{ReadOnly, Write};

    let mut t = HashMap::new();

    // keys
    entry(&mut t, "del", commands::keys::del, write_first_key, 2, Write);
    entry(&mut t, "exists", commands::keys::exists, read_first_key, 2, ReadOnly);
    entry(&mut t, "expire", commands::keys::expire, write_first_key, 3, Write);
    entry(&mut t, "expireat", commands::keys::expire_at, write_first_key, 3, Write);
    entry(&mut t, "pexpireat", commands::keys::pexpire_at, write_first_key, 3, Write);
    entry(&mut t, "persist", commands::keys::persist, write_first_key, 2, Write);
    entry(&mut t, "ttl", commands::keys::ttl, read_first_key, 2, ReadOnly);
    entry(&mut t, "pttl", commands::keys::pttl, read_first_key, 2, ReadOnly);
    entry(&mut t, "keyversion", commands::keys::key_version, read_first_key, 2, ReadOnly);

    // strings
    entry(&mut t, "set", commands::string::set, write_first_key, 3, Write);
    entry(&mut t, "setnx", commands::string::setnx, write_first_key, 3, Write);
    entry(&mut t, "get", commands::string::get, read_first_key, 2, ReadOnly);
    entry(&mut t, "getset", commands::string::getset, write_first_key, 3, Write);
    entry(&mut t, "strlen", commands::string::strlen, read_first_key, 2, ReadOnly);

    // hashes
    entry(&mut t, "hset", commands::hash::hset, write_first_key, -4, Write);
    entry(&mut t, "hsetnx", commands::hash::hsetnx, write_first_key, 4, Write);
    entry(&mut t, "hget", commands::hash::hget, read_first_key, 3, ReadOnly);
    entry(&mut t, "hdel", commands::hash::hdel, write_first_key, -3, Write);
    entry(&mut t, "hexists", commands::hash::hexists, read_first_key, 3, ReadOnly);
    entry(&mut t, "hgetall", commands::hash::hgetall, read_first_key, 2, ReadOnly);
    entry(&mut t, "hincrby", commands::hash::hincrby, write_first_key, 4, Write);
    entry(&mut t, "hkeys", commands::hash::hkeys, read_first_key, 2, ReadOnly);
    entry(&mut t, "hvals", commands::hash::hvals, read_first_key, 2, ReadOnly);
    entry(&mut t, "hlen", commands::hash::hlen, read_first_key, 2, ReadOnly);

    // lists
    entry(&mut t, "lpush", commands::list::lpush, write_first_key, -3, Write);
    entry(&mut t, "lpushx", commands::list::lpushx, write_first_key, 3, Write);
    entry(&mut t, "rpush", commands::list::rpush, write_first_key, -3, Write);
    entry(&mut t, "rpushx", commands::list::rpushx, write_first_key, 3, Write);
    entry(&mut t, "lpop", commands::list::lpop, write_first_key, 2, Write);
    entry(&mut t, "rpop", commands::list::rpop, write_first_key, 2, Write);
    entry(&mut t, "lindex", commands::list::lindex, read_first_key, 3, ReadOnly);
    entry(&mut t, "llen", commands::list::llen, read_first_key, 2, ReadOnly);
    entry(&mut t, "lrem", commands::list::lrem, write_first_key, 4, Write);
    entry(&mut t, "ltrim", commands::list::ltrim, write_first_key, 4, Write);
    entry(&mut t, "lrange", commands::list::lrange, read_first_key, 4, ReadOnly);
    entry(&mut t, "lset", commands::list::lset, write_first_key, 4, Write);

    // sets
    entry(&mut t, "sadd", commands::set::sadd, write_first_key, -3, Write);
    entry(&mut t, "srem", commands::set::srem, write_first_key, -3, Write);
    entry(&mut t, "smembers", commands::set::smembers, read_first_key, 2, ReadOnly);
    entry(&mut t, "sismember", commands::set::sismember, read_first_key, 3, ReadOnly);
    entry(&mut t, "scard", commands::set::scard, read_first_key, 2, ReadOnly);

    // sorted sets
    entry(&mut t, "zadd", commands::zset::zadd, write_first_key, -4, Write);
    entry(&mut t, "zcard", commands::zset::zcard, read_first_key, 2, ReadOnly);
    entry(&mut t, "zscore", commands::zset::zscore, read_first_key, 3, ReadOnly);
    entry(&mut t, "zcount", commands::zset::zcount, read_first_key, 4, ReadOnly);
    entry(&mut t, "zincrby", commands::zset::zincrby, write_first_key, 4, Write);
    entry(&mut t, "zrange", commands::zset::zrange, read_first_key, -4, ReadOnly);
    entry(&mut t, "zrevrange", commands::zset::zrevrange, read_first_key, -4, ReadOnly);
    entry(&mut t, "zrangebyscore", commands::zset::zrangebyscore, read_first_key, -4, ReadOnly);
    entry(&mut t, "zrevrangebyscore", commands::zset::zrevrangebyscore, read_first_key, -4, ReadOnly);
    entry(&mut t, "zrank", commands::zset::zrank, read_first_key, 3, ReadOnly);
    entry(&mut t, "zrevrank", commands::zset::zrevrank, read_first_key, 3, ReadOnly);
    entry(&mut t, "zrem", commands::zset::zrem, write_first_key, -3, Write);
    entry(&mut t, "zremrangebyrank", commands::zset::zremrangebyrank, write_first_key, 4, Write);
    entry(&mut t, "zremrangebyscore", commands::zset::zremrangebyscore, write_first_key, 4, Write);

    t
}
