//! Generic key commands: existence, deletion, TTL management, versions.

use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::Frame;

use crate::commands::{arg_str, parse_i64};
use crate::db::registry::AofExpireCtx;
use crate::db::Db;
use crate::time;

pub fn del(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    if !db.contains_key(&key) {
        return (Frame::Integer(0), None);
    }
    db.remove(&key);
    (Frame::Integer(1), AofExpireCtx::aof())
}

pub fn exists(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let found = db.contains_key(&key);
    (Frame::Integer(i64::from(found)), None)
}

pub fn expire(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let seconds = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    if !db.contains_key(&key) {
        return (Frame::Integer(0), None);
    }
    let at_ms = time::now_ms().saturating_add_signed(seconds.saturating_mul(1000));
    db.expire_at(&key, at_ms);
    (Frame::Integer(1), AofExpireCtx::aof_with_expire(at_ms))
}

pub fn expire_at(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let unix_secs = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    if !db.contains_key(&key) {
        return (Frame::Integer(0), None);
    }
    let at_ms = (unix_secs.max(0) as u64).saturating_mul(1000);
    db.expire_at(&key, at_ms);
    (Frame::Integer(1), AofExpireCtx::aof_with_expire(at_ms))
}

pub fn pexpire_at(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let unix_ms = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    if !db.contains_key(&key) {
        return (Frame::Integer(0), None);
    }
    let at_ms = unix_ms.max(0) as u64;
    db.expire_at(&key, at_ms);
    (Frame::Integer(1), AofExpireCtx::aof_with_expire(at_ms))
}

pub fn persist(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    if !db.contains_key(&key) {
        return (Frame::Integer(0), None);
    }
    if db.expire_time(&key).is_none() {
        return (Frame::Integer(0), None);
    }
    db.persist(&key);
    (Frame::Integer(1), AofExpireCtx::aof())
}

pub fn ttl(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    if !db.contains_key(&key) {
        return (Frame::Integer(-2), None);
    }
    match db.expire_time(&key) {
        Some(at_ms) => {
            let remaining = at_ms.saturating_sub(time::now_ms()) / 1000;
            (Frame::Integer(remaining as i64), None)
        }
        None => (Frame::Integer(-1), None),
    }
}

pub fn pttl(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    if !db.contains_key(&key) {
        return (Frame::Integer(-2), None);
    }
    match db.expire_time(&key) {
        Some(at_ms) => {
            let remaining = at_ms.saturating_sub(time::now_ms());
            (Frame::Integer(remaining as i64), None)
        }
        None => (Frame::Integer(-1), None),
    }
}

pub fn key_version(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    (Frame::Integer(i64::from(db.get_version(&key))), None)
}
