//! List commands over the paged quicklist.

use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::Frame;

use crate::commands::{arg_str, parse_i64};
use crate::db::registry::AofExpireCtx;
use crate::db::Db;
use crate::types::quicklist::QuickList;

pub fn lpush(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let result = db.with_list_or_init(&key, |list| {
        for value in &args[1..] {
            list.insert(0, value.clone());
        }
        list.len()
    });
    match result {
        Ok(len) => (Frame::Integer(len as i64), AofExpireCtx::aof()),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn lpushx(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_list_mut(&key, |list| {
        list.insert(0, args[1].clone());
        list.len()
    }) {
        Ok(Some(len)) => (Frame::Integer(len as i64), AofExpireCtx::aof()),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn rpush(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let result = db.with_list_or_init(&key, |list| {
        for value in &args[1..] {
            list.push_back(value.clone());
        }
        list.len()
    });
    match result {
        Ok(len) => (Frame::Integer(len as i64), AofExpireCtx::aof()),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn rpushx(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_list_mut(&key, |list| {
        list.push_back(args[1].clone());
        list.len()
    }) {
        Ok(Some(len)) => (Frame::Integer(len as i64), AofExpireCtx::aof()),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn lpop(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_list_mut(&key, |list| {
        let val = list.remove(0);
        (val, list.is_empty())
    }) {
        Ok(Some((val, emptied))) => {
            if emptied {
                db.remove(&key);
            }
            (Frame::Bulk(val), AofExpireCtx::aof())
        }
        Ok(None) => (Frame::Null, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn rpop(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_list_mut(&key, |list| {
        let val = list.remove_last().expect("stored lists are never empty");
        (val, list.is_empty())
    }) {
        Ok(Some((val, emptied))) => {
            if emptied {
                db.remove(&key);
            }
            (Frame::Bulk(val), AofExpireCtx::aof())
        }
        Ok(None) => (Frame::Null, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn lindex(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let index = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    match db.with_list(&key, |list| {
        let len = list.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        if resolved < 0 || resolved >= len {
            None
        } else {
            Some(list.get(resolved as usize).clone())
        }
    }) {
        Ok(Some(Some(val))) => (Frame::Bulk(val), None),
        Ok(_) => (Frame::Null, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn llen(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_list(&key, QuickList::len) {
        Ok(Some(len)) => (Frame::Integer(len as i64), None),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn lrem(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let count = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    let target = args[2].clone();

    match db.with_list_mut(&key, |list| {
        let matches = |val: &Bytes| val == &target;
        let removed = match count.cmp(&0) {
            std::cmp::Ordering::Equal => list.remove_all_by_val(matches),
            std::cmp::Ordering::Greater => list.remove_by_val(matches, count as usize),
            std::cmp::Ordering::Less => {
                list.reverse_remove_by_val(matches, count.unsigned_abs() as usize)
            }
        };
        (removed, list.is_empty())
    }) {
        Ok(Some((removed, emptied))) => {
            if emptied {
                db.remove(&key);
            }
            let ctx = if removed > 0 { AofExpireCtx::aof() } else { None };
            (Frame::Integer(removed as i64), ctx)
        }
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn ltrim(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };

    match db.with_list_mut(&key, |list| {
        let (start, stop) = resolve_range(list.len(), start, stop);
        // drop everything outside the kept range [start, stop)
        for _ in stop..list.len() {
            list.remove(stop);
        }
        for _ in 0..start {
            list.remove(0);
        }
        list.is_empty()
    }) {
        Ok(Some(emptied)) => {
            if emptied {
                db.remove(&key);
            }
            (Frame::ok(), AofExpireCtx::aof())
        }
        Ok(None) => (Frame::ok(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn lrange(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };

    match db.with_list(&key, |list| {
        let (start, stop) = resolve_range(list.len(), start, stop);
        if start >= stop {
            return Vec::new();
        }
        list.range(start, stop)
    }) {
        Ok(Some(values)) => (
            Frame::Array(values.into_iter().map(Frame::Bulk).collect()),
            None,
        ),
        Ok(None) => (Frame::empty_array(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn lset(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let index = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    let value = args[2].clone();

    match db.with_list_mut(&key, |list| {
        let len = list.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        if resolved < 0 || resolved >= len {
            false
        } else {
            list.set(resolved as usize, value);
            true
        }
    }) {
        Ok(Some(true)) => (Frame::ok(), AofExpireCtx::aof()),
        Ok(_) => (Frame::err("ERR index out of range"), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

/// Resolves possibly-negative LRANGE/LTRIM bounds into a clamped,
/// half-open `[start, stop)` over a list of length `len`.
fn resolve_range(len: usize, start: i64, stop: i64) -> (usize, usize) {
    let len = len as i64;
    let resolve = |pos: i64| -> i64 {
        if pos < 0 {
            (len + pos).max(0)
        } else {
            pos
        }
    };
    let start = resolve(start).min(len);
    let stop = (resolve(stop) + 1).min(len);
    (start as usize, stop.max(start) as usize)
}
