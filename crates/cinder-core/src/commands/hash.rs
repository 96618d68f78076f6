//! Hash commands.

use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::Frame;

use crate::commands::{arg_str, parse_i64};
use crate::db::registry::AofExpireCtx;
use crate::db::Db;

pub fn hset(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    if args.len() % 2 != 1 {
        return (Frame::arg_num_err("hset"), None);
    }
    let key = arg_str(&args[0]);

    let result = db.with_hash_or_init(&key, |hash| {
        let mut new_fields = 0;
        for pair in args[1..].chunks_exact(2) {
            let field = arg_str(&pair[0]);
            if hash.insert(field, pair[1].clone()).is_none() {
                new_fields += 1;
            }
        }
        new_fields
    });

    match result {
        Ok(new_fields) => (Frame::Integer(new_fields), AofExpireCtx::aof()),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hsetnx(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    let value = args[2].clone();

    let result = db.with_hash_or_init(&key, |hash| {
        if hash.contains_key(&field) {
            0
        } else {
            hash.insert(field.clone(), value.clone());
            1
        }
    });

    match result {
        Ok(0) => (Frame::Integer(0), None),
        Ok(n) => (Frame::Integer(n), AofExpireCtx::aof()),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hget(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    match db.with_hash(&key, |hash| hash.get(&field).cloned()) {
        Ok(Some(Some(value))) => (Frame::Bulk(value), None),
        Ok(_) => (Frame::Null, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hdel(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let result = db.with_hash_mut(&key, |hash| {
        let mut removed = 0;
        for field in &args[1..] {
            if hash.remove(&arg_str(field)).is_some() {
                removed += 1;
            }
        }
        (removed, hash.is_empty())
    });
    match result {
        Ok(None) => (Frame::Integer(0), None),
        Ok(Some((removed, emptied))) => {
            if emptied {
                db.remove(&key);
            }
            let ctx = if removed > 0 { AofExpireCtx::aof() } else { None };
            (Frame::Integer(removed), ctx)
        }
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hexists(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    match db.with_hash(&key, |hash| hash.contains_key(&field)) {
        Ok(Some(true)) => (Frame::Integer(1), None),
        Ok(_) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hgetall(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_hash(&key, |hash| {
        let mut out = Vec::with_capacity(hash.len() * 2);
        for (field, value) in hash {
            out.push(Frame::Bulk(Bytes::copy_from_slice(field.as_bytes())));
            out.push(Frame::Bulk(value.clone()));
        }
        out
    }) {
        Ok(Some(out)) => (Frame::Array(out), None),
        Ok(None) => (Frame::empty_array(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hincrby(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let field = arg_str(&args[1]);
    let delta = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };

    let result = db.with_hash_or_init(&key, |hash| {
        let current: i64 = match hash.get(&field) {
            Some(raw) => match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                Some(n) => n,
                None => return Err(Frame::not_an_integer()),
            },
            None => 0,
        };
        let Some(next) = current.checked_add(delta) else {
            return Err(Frame::not_an_integer());
        };
        hash.insert(field.clone(), Bytes::from(next.to_string()));
        Ok(next)
    });

    match result {
        Ok(Ok(next)) => (Frame::Integer(next), AofExpireCtx::aof()),
        Ok(Err(reply)) => (reply, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hkeys(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_hash(&key, |hash| {
        hash.keys()
            .map(|field| Frame::Bulk(Bytes::copy_from_slice(field.as_bytes())))
            .collect::<Vec<_>>()
    }) {
        Ok(Some(out)) => (Frame::Array(out), None),
        Ok(None) => (Frame::empty_array(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hvals(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_hash(&key, |hash| {
        hash.values()
            .map(|value| Frame::Bulk(value.clone()))
            .collect::<Vec<_>>()
    }) {
        Ok(Some(out)) => (Frame::Array(out), None),
        Ok(None) => (Frame::empty_array(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn hlen(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_hash(&key, |hash| hash.len()) {
        Ok(Some(len)) => (Frame::Integer(len as i64), None),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use cinder_protocol::Frame;

    use crate::commands::testutil::{db, run, wire};

    #[test]
    fn hset_counts_only_new_fields() {
        let db = db();
        assert_eq!(run(&db, &["HSET", "h", "f1", "v1"]), Frame::Integer(1));
        // f1 is updated, only f2 is new
        assert_eq!(
            run(&db, &["HSET", "h", "f1", "v2", "f2", "v3"]),
            Frame::Integer(1)
        );
        assert_eq!(
            run(&db, &["HGET", "h", "f1"]),
            Frame::Bulk(Bytes::from_static(b"v2"))
        );
        assert_eq!(wire(&run(&db, &["HGET", "h", "f1"])), b"$2\r\nv2\r\n");
        assert_eq!(run(&db, &["HLEN", "h"]), Frame::Integer(2));
    }

    #[test]
    fn hset_rejects_dangling_pair() {
        let db = db();
        assert_eq!(
            run(&db, &["HSET", "h", "f1", "v1", "f2"]),
            Frame::arg_num_err("hset")
        );
    }

    #[test]
    fn hsetnx_preserves_existing() {
        let db = db();
        assert_eq!(run(&db, &["HSETNX", "h", "f", "a"]), Frame::Integer(1));
        assert_eq!(run(&db, &["HSETNX", "h", "f", "b"]), Frame::Integer(0));
        assert_eq!(
            run(&db, &["HGET", "h", "f"]),
            Frame::Bulk(Bytes::from_static(b"a"))
        );
    }

    #[test]
    fn hget_missing_field_or_key() {
        let db = db();
        assert_eq!(run(&db, &["HGET", "nope", "f"]), Frame::Null);
        run(&db, &["HSET", "h", "f", "v"]);
        assert_eq!(run(&db, &["HGET", "h", "other"]), Frame::Null);
    }

    #[test]
    fn hdel_removes_fields_and_empty_hash() {
        let db = db();
        run(&db, &["HSET", "h", "a", "1", "b", "2"]);
        assert_eq!(run(&db, &["HDEL", "h", "a", "missing"]), Frame::Integer(1));
        assert_eq!(run(&db, &["HLEN", "h"]), Frame::Integer(1));
        assert_eq!(run(&db, &["HDEL", "h", "b"]), Frame::Integer(1));
        // deleting the last field removes the key itself
        assert_eq!(run(&db, &["EXISTS", "h"]), Frame::Integer(0));
    }

    #[test]
    fn hexists_checks_field() {
        let db = db();
        run(&db, &["HSET", "h", "f", "v"]);
        assert_eq!(run(&db, &["HEXISTS", "h", "f"]), Frame::Integer(1));
        assert_eq!(run(&db, &["HEXISTS", "h", "g"]), Frame::Integer(0));
        assert_eq!(run(&db, &["HEXISTS", "nope", "f"]), Frame::Integer(0));
    }

    #[test]
    fn hgetall_pairs_fields_with_values() {
        let db = db();
        run(&db, &["HSET", "h", "f", "v"]);
        let Frame::Array(items) = run(&db, &["HGETALL", "h"]) else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Frame::Bulk(Bytes::from_static(b"f")));
        assert_eq!(items[1], Frame::Bulk(Bytes::from_static(b"v")));
        assert_eq!(run(&db, &["HGETALL", "nope"]), Frame::empty_array());
    }

    #[test]
    fn hincrby_creates_and_accumulates() {
        let db = db();
        assert_eq!(run(&db, &["HINCRBY", "h", "n", "5"]), Frame::Integer(5));
        assert_eq!(run(&db, &["HINCRBY", "h", "n", "-2"]), Frame::Integer(3));
        assert_eq!(
            run(&db, &["HGET", "h", "n"]),
            Frame::Bulk(Bytes::from_static(b"3"))
        );
    }

    #[test]
    fn hincrby_rejects_non_integer_field() {
        let db = db();
        run(&db, &["HSET", "h", "s", "abc"]);
        assert_eq!(run(&db, &["HINCRBY", "h", "s", "1"]), Frame::not_an_integer());
    }

    #[test]
    fn hincrby_detects_overflow() {
        let db = db();
        let max = i64::MAX.to_string();
        run(&db, &["HSET", "h", "n", &max]);
        assert_eq!(run(&db, &["HINCRBY", "h", "n", "1"]), Frame::not_an_integer());
        // value unchanged after the failed increment
        assert_eq!(
            run(&db, &["HGET", "h", "n"]),
            Frame::Bulk(Bytes::from(max))
        );

        let min = i64::MIN.to_string();
        run(&db, &["HSET", "h", "m", &min]);
        assert_eq!(run(&db, &["HINCRBY", "h", "m", "-1"]), Frame::not_an_integer());
    }

    #[test]
    fn hkeys_hvals_hlen() {
        let db = db();
        run(&db, &["HSET", "h", "a", "1", "b", "2"]);
        let Frame::Array(keys) = run(&db, &["HKEYS", "h"]) else {
            panic!("expected array");
        };
        assert_eq!(keys.len(), 2);
        let Frame::Array(vals) = run(&db, &["HVALS", "h"]) else {
            panic!("expected array");
        };
        assert_eq!(vals.len(), 2);
        assert_eq!(run(&db, &["HLEN", "h"]), Frame::Integer(2));
        assert_eq!(run(&db, &["HLEN", "nope"]), Frame::Integer(0));
    }

    #[test]
    fn wrong_type_against_string_key() {
        let db = db();
        run(&db, &["SET", "k", "v"]);
        assert_eq!(run(&db, &["HSET", "k", "f", "v"]), Frame::wrong_type());
        assert_eq!(run(&db, &["HGET", "k", "f"]), Frame::wrong_type());
        assert_eq!(run(&db, &["HLEN", "k"]), Frame::wrong_type());
    }
}
