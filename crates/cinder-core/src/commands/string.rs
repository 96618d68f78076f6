//! String commands.

use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::Frame;

use crate::commands::arg_str;
use crate::db::registry::AofExpireCtx;
use crate::db::Db;
use crate::types::DataEntity;

pub fn set(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    db.put_entity(key.clone(), DataEntity::Bytes(args[1].clone()));
    // a plain SET discards any previous expiry
    db.persist(&key);
    (Frame::ok(), AofExpireCtx::aof())
}

pub fn setnx(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    if db.contains_key(&key) {
        return (Frame::Integer(0), None);
    }
    db.put_entity(key, DataEntity::Bytes(args[1].clone()));
    (Frame::Integer(1), AofExpireCtx::aof())
}

pub fn get(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_string(&key, Bytes::clone) {
        Ok(Some(raw)) => (Frame::Bulk(raw), None),
        Ok(None) => (Frame::Null, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn getset(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let old = match db.with_string(&key, Bytes::clone) {
        Ok(old) => old,
        Err(()) => return (Frame::wrong_type(), None),
    };
    db.put_entity(key.clone(), DataEntity::Bytes(args[1].clone()));
    db.persist(&key);
    let reply = match old {
        Some(raw) => Frame::Bulk(raw),
        None => Frame::Null,
    };
    (reply, AofExpireCtx::aof())
}

pub fn strlen(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_string(&key, Bytes::len) {
        Ok(Some(len)) => (Frame::Integer(len as i64), None),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}
