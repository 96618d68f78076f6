//! Set commands.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::Frame;

use crate::commands::arg_str;
use crate::db::registry::AofExpireCtx;
use crate::db::Db;

pub fn sadd(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let result = db.with_set_or_init(&key, |set| {
        let mut added = 0;
        for member in &args[1..] {
            if set.insert(arg_str(member)) {
                added += 1;
            }
        }
        added
    });
    match result {
        Ok(added) => (Frame::Integer(added), AofExpireCtx::aof()),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn srem(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_set_mut(&key, |set| {
        let mut removed = 0;
        for member in &args[1..] {
            if set.remove(&arg_str(member)) {
                removed += 1;
            }
        }
        (removed, set.is_empty())
    }) {
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

pub fn smembers(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_set(&key, |set| {
        set.iter()
            .map(|member| Frame::Bulk(Bytes::copy_from_slice(member.as_bytes())))
            .collect::<Vec<_>>()
    }) {
        Ok(Some(out)) => (Frame::Array(out), None),
        Ok(None) => (Frame::empty_array(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn sismember(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let member = arg_str(&args[1]);
    match db.with_set(&key, |set| set.contains(&member)) {
        Ok(Some(true)) => (Frame::Integer(1), None),
        Ok(_) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn scard(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_set(&key, HashSet::len) {
        Ok(Some(len)) => (Frame::Integer(len as i64), None),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

#[cfg(test)]
mod tests {
    use cinder_protocol::Frame;

    use crate::commands::testutil::{db, run};

    #[test]
    fn sadd_counts_new_members() {
        let db = db();
        assert_eq!(run(&db, &["SADD", "s", "a", "b"]), Frame::Integer(2));
        assert_eq!(run(&db, &["SADD", "s", "b", "c"]), Frame::Integer(1));
        assert_eq!(run(&db, &["SCARD", "s"]), Frame::Integer(3));
    }

    #[test]
    fn srem_removes_and_cleans_up() {
        let db = db();
        run(&db, &["SADD", "s", "a", "b"]);
        assert_eq!(run(&db, &["SREM", "s", "a", "missing"]), Frame::Integer(1));
        assert_eq!(run(&db, &["SREM", "s", "b"]), Frame::Integer(1));
        assert_eq!(run(&db, &["EXISTS", "s"]), Frame::Integer(0));
        assert_eq!(run(&db, &["SREM", "nope", "x"]), Frame::Integer(0));
    }

    #[test]
    fn sismember_and_smembers() {
        let db = db();
        run(&db, &["SADD", "s", "a"]);
        assert_eq!(run(&db, &["SISMEMBER", "s", "a"]), Frame::Integer(1));
        assert_eq!(run(&db, &["SISMEMBER", "s", "b"]), Frame::Integer(0));
        assert_eq!(run(&db, &["SISMEMBER", "nope", "a"]), Frame::Integer(0));

        let Frame::Array(members) = run(&db, &["SMEMBERS", "s"]) else {
            panic!("expected array");
        };
        assert_eq!(members.len(), 1);
        assert_eq!(run(&db, &["SMEMBERS", "nope"]), Frame::empty_array());
    }

    #[test]
    fn wrong_type_against_string_key() {
        let db = db();
        run(&db, &["SET", "k", "v"]);
        assert_eq!(run(&db, &["SADD", "k", "a"]), Frame::wrong_type());
        assert_eq!(run(&db, &["SCARD", "k"]), Frame::wrong_type());
    }
}
