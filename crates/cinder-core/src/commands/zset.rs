//! Sorted-set commands.

use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::Frame;

use crate::commands::{arg_str, parse_f64, parse_i64};
use crate::db::registry::AofExpireCtx;
use crate::db::Db;
use crate::marshal::format_score;
use crate::types::sorted_set::{Element, ScoreBorder, SortedSet};

const BORDER_ERR: &str = "ERR min or max is not a float";

fn parse_border(raw: &Bytes) -> Result<ScoreBorder, Frame> {
    let text = arg_str(raw);
    ScoreBorder::parse(&text).map_err(|_| Frame::err(BORDER_ERR))
}

pub fn zadd(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    if args.len() % 2 != 1 {
        return (Frame::syntax_err(), None);
    }
    let key = arg_str(&args[0]);

    let mut elements = Vec::with_capacity((args.len() - 1) / 2);
    for pair in args[1..].chunks_exact(2) {
        let score = match parse_f64(&pair[0]) {
            Ok(s) => s,
            Err(e) => return (e, None),
        };
        elements.push(Element {
            member: arg_str(&pair[1]),
            score,
        });
    }

    let result = db.with_zset_or_init(&key, |zset| {
        let mut added = 0;
        for element in &elements {
            if zset.add(&element.member, element.score) {
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

pub fn zcard(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_zset(&key, SortedSet::len) {
        Ok(Some(len)) => (Frame::Integer(len as i64), None),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zscore(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let member = arg_str(&args[1]);
    match db.with_zset(&key, |zset| zset.get(&member)) {
        Ok(Some(Some(score))) => (Frame::Bulk(Bytes::from(format_score(score))), None),
        Ok(_) => (Frame::Null, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zcount(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let min = match parse_border(&args[1]) {
        Ok(b) => b,
        Err(e) => return (e, None),
    };
    let max = match parse_border(&args[2]) {
        Ok(b) => b,
        Err(e) => return (e, None),
    };
    match db.with_zset(&key, |zset| zset.count(&min, &max)) {
        Ok(Some(n)) => (Frame::Integer(n as i64), None),
        Ok(None) => (Frame::Integer(0), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zincrby(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let delta = match parse_f64(&args[1]) {
        Ok(d) => d,
        Err(e) => return (e, None),
    };
    let member = arg_str(&args[2]);

    let result = db.with_zset_or_init(&key, |zset| {
        let next = zset.get(&member).map_or(delta, |score| score + delta);
        zset.add(&member, next);
        next
    });
    match result {
        Ok(next) => (
            Frame::Bulk(Bytes::from(format_score(next))),
            AofExpireCtx::aof(),
        ),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zrange(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    range_by_rank(db, args, false)
}

pub fn zrevrange(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    range_by_rank(db, args, true)
}

fn range_by_rank(db: &Arc<Db>, args: &[Bytes], desc: bool) -> (Frame, Option<AofExpireCtx>) {
    if args.len() != 3 && args.len() != 4 {
        return (Frame::arg_num_err("zrange"), None);
    }
    let with_scores = if args.len() == 4 {
        if !arg_str(&args[3]).eq_ignore_ascii_case("withscores") {
            return (Frame::syntax_err(), None);
        }
        true
    } else {
        false
    };

    let key = arg_str(&args[0]);
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };

    match db.with_zset(&key, |zset| {
        let Some((start, stop)) = clamp_rank_range(zset.len(), start, stop) else {
            return Vec::new();
        };
        zset.range(start, stop, desc)
    }) {
        Ok(Some(elements)) => (elements_reply(&elements, with_scores), None),
        Ok(None) => (Frame::empty_array(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zrangebyscore(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    range_by_score(db, args, false)
}

pub fn zrevrangebyscore(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    range_by_score(db, args, true)
}

fn range_by_score(db: &Arc<Db>, args: &[Bytes], desc: bool) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    // for the reversed form the wire order is (max, min)
    let (first, second) = (&args[1], &args[2]);
    let (raw_min, raw_max) = if desc { (second, first) } else { (first, second) };
    let min = match parse_border(raw_min) {
        Ok(b) => b,
        Err(e) => return (e, None),
    };
    let max = match parse_border(raw_max) {
        Ok(b) => b,
        Err(e) => return (e, None),
    };

    let mut with_scores = false;
    let mut offset = 0i64;
    let mut limit = -1i64;
    let mut i = 3;
    while i < args.len() {
        let opt = arg_str(&args[i]);
        if opt.eq_ignore_ascii_case("withscores") {
            with_scores = true;
            i += 1;
        } else if opt.eq_ignore_ascii_case("limit") {
            if args.len() < i + 3 {
                return (Frame::syntax_err(), None);
            }
            offset = match parse_i64(&args[i + 1]) {
                Ok(n) => n,
                Err(e) => return (e, None),
            };
            limit = match parse_i64(&args[i + 2]) {
                Ok(n) => n,
                Err(e) => return (e, None),
            };
            i += 3;
        } else {
            return (Frame::syntax_err(), None);
        }
    }

    match db.with_zset(&key, |zset| zset.range_by_score(&min, &max, offset, limit, desc)) {
        Ok(Some(elements)) => (elements_reply(&elements, with_scores), None),
        Ok(None) => (Frame::empty_array(), None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zrank(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    rank(db, args, false)
}

pub fn zrevrank(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    rank(db, args, true)
}

fn rank(db: &Arc<Db>, args: &[Bytes], desc: bool) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let member = arg_str(&args[1]);
    match db.with_zset(&key, |zset| zset.get_rank(&member, desc)) {
        Ok(Some(rank)) if rank >= 0 => (Frame::Integer(rank), None),
        Ok(_) => (Frame::Null, None),
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zrem(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    match db.with_zset_mut(&key, |zset| {
        let mut removed = 0;
        for member in &args[1..] {
            if zset.remove(&arg_str(member)) {
                removed += 1;
            }
        }
        (removed, zset.is_empty())
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

pub fn zremrangebyrank(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let start = match parse_i64(&args[1]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };
    let stop = match parse_i64(&args[2]) {
        Ok(n) => n,
        Err(e) => return (e, None),
    };

    match db.with_zset_mut(&key, |zset| {
        let Some((start, stop)) = clamp_rank_range(zset.len(), start, stop) else {
            return (0, zset.is_empty());
        };
        let removed = zset.remove_by_rank(start, stop);
        (removed, zset.is_empty())
    }) {
        Ok(None) => (Frame::Integer(0), None),
        Ok(Some((removed, emptied))) => {
            if emptied {
                db.remove(&key);
            }
            let ctx = if removed > 0 { AofExpireCtx::aof() } else { None };
            (Frame::Integer(removed as i64), ctx)
        }
        Err(()) => (Frame::wrong_type(), None),
    }
}

pub fn zremrangebyscore(db: &Arc<Db>, args: &[Bytes]) -> (Frame, Option<AofExpireCtx>) {
    let key = arg_str(&args[0]);
    let min = match parse_border(&args[1]) {
        Ok(b) => b,
        Err(e) => return (e, None),
    };
    let max = match parse_border(&args[2]) {
        Ok(b) => b,
        Err(e) => return (e, None),
    };

    match db.with_zset_mut(&key, |zset| {
        let removed = zset.remove_by_score(&min, &max);
        (removed, zset.is_empty())
    }) {
        Ok(None) => (Frame::Integer(0), None),
        Ok(Some((removed, emptied))) => {
            if emptied {
                db.remove(&key);
            }
            let ctx = if removed > 0 { AofExpireCtx::aof() } else { None };
            (Frame::Integer(removed as i64), ctx)
        }
        Err(()) => (Frame::wrong_type(), None),
    }
}

/// Clamps possibly-negative rank bounds into a half-open `[start, stop)`
/// over a set of `size` members. `None` means the range is empty.
fn clamp_rank_range(size: u64, start: i64, stop: i64) -> Option<(u64, u64)> {
    let size = size as i64;
    let start = if start < -size {
        0
    } else if start < 0 {
        size + start
    } else if start >= size {
        return None;
    } else {
        start
    };
    let stop = if stop < -size {
        0
    } else if stop < 0 {
        size + stop + 1
    } else if stop < size {
        stop + 1
    } else {
        size
    };
    let stop = stop.max(start);
    Some((start as u64, stop as u64))
}

fn elements_reply(elements: &[Element], with_scores: bool) -> Frame {
    let mut out = Vec::with_capacity(elements.len() * if with_scores { 2 } else { 1 });
    for element in elements {
        out.push(Frame::Bulk(Bytes::copy_from_slice(element.member.as_bytes())));
        if with_scores {
            out.push(Frame::Bulk(Bytes::from(format_score(element.score))));
        }
    }
    Frame::Array(out)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use cinder_protocol::Frame;

    use crate::commands::testutil::{db, run, wire};

    fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    fn items(frame: Frame) -> Vec<String> {
        let Frame::Array(frames) = frame else {
            panic!("expected array, got {frame:?}");
        };
        frames
            .into_iter()
            .map(|f| match f {
                Frame::Bulk(b) => String::from_utf8_lossy(&b).into_owned(),
                other => panic!("expected bulk, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn zadd_and_rank_scenario() {
        let db = db();
        assert_eq!(run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c"]), Frame::Integer(3));

        let reply = run(&db, &["ZRANGE", "s", "0", "-1", "WITHSCORES"]);
        assert_eq!(
            wire(&reply),
            b"*6\r\n$1\r\na\r\n$1\r\n1\r\n$1\r\nb\r\n$1\r\n2\r\n$1\r\nc\r\n$1\r\n3\r\n"
        );

        assert_eq!(run(&db, &["ZRANK", "s", "b"]), Frame::Integer(1));
        assert_eq!(run(&db, &["ZREVRANK", "s", "b"]), Frame::Integer(1));
    }

    #[test]
    fn zadd_updates_do_not_count() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a"]);
        assert_eq!(run(&db, &["ZADD", "s", "5", "a", "2", "b"]), Frame::Integer(1));
        assert_eq!(run(&db, &["ZSCORE", "s", "a"]), bulk("5"));
    }

    #[test]
    fn zadd_syntax_checks() {
        let db = db();
        assert_eq!(run(&db, &["ZADD", "s", "1", "a", "2"]), Frame::syntax_err());
        assert_eq!(run(&db, &["ZADD", "s", "x", "a"]), Frame::not_a_float());
        assert_eq!(run(&db, &["ZADD", "s", "nan", "a"]), Frame::not_a_float());
    }

    #[test]
    fn zcard_and_zscore() {
        let db = db();
        assert_eq!(run(&db, &["ZCARD", "nope"]), Frame::Integer(0));
        run(&db, &["ZADD", "s", "1.5", "a"]);
        assert_eq!(run(&db, &["ZCARD", "s"]), Frame::Integer(1));
        assert_eq!(run(&db, &["ZSCORE", "s", "a"]), bulk("1.5"));
        assert_eq!(run(&db, &["ZSCORE", "s", "ghost"]), Frame::Null);
        assert_eq!(run(&db, &["ZSCORE", "nope", "a"]), Frame::Null);
    }

    #[test]
    fn zcount_with_borders() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(run(&db, &["ZCOUNT", "s", "1", "3"]), Frame::Integer(3));
        assert_eq!(run(&db, &["ZCOUNT", "s", "(1", "3"]), Frame::Integer(2));
        assert_eq!(run(&db, &["ZCOUNT", "s", "-inf", "+inf"]), Frame::Integer(3));
        assert_eq!(
            run(&db, &["ZCOUNT", "s", "bad", "3"]),
            Frame::err("ERR min or max is not a float")
        );
    }

    #[test]
    fn zincrby_accumulates() {
        let db = db();
        assert_eq!(run(&db, &["ZINCRBY", "s", "2.5", "m"]), bulk("2.5"));
        assert_eq!(run(&db, &["ZINCRBY", "s", "1.5", "m"]), bulk("4"));
        assert_eq!(run(&db, &["ZSCORE", "s", "m"]), bulk("4"));
    }

    #[test]
    fn zrange_negative_indices() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(items(run(&db, &["ZRANGE", "s", "-2", "-1"])), vec!["b", "c"]);
        assert_eq!(items(run(&db, &["ZRANGE", "s", "0", "100"])), vec!["a", "b", "c"]);
        assert!(items(run(&db, &["ZRANGE", "s", "5", "10"])).is_empty());
        assert_eq!(run(&db, &["ZRANGE", "nope", "0", "-1"]), Frame::empty_array());
    }

    #[test]
    fn zrevrange_reverses() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(items(run(&db, &["ZREVRANGE", "s", "0", "-1"])), vec!["c", "b", "a"]);
        assert_eq!(items(run(&db, &["ZREVRANGE", "s", "0", "0"])), vec!["c"]);
    }

    #[test]
    fn zrangebyscore_options() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c", "4", "d"]);
        assert_eq!(
            items(run(&db, &["ZRANGEBYSCORE", "s", "2", "+inf"])),
            vec!["b", "c", "d"]
        );
        assert_eq!(
            items(run(&db, &["ZRANGEBYSCORE", "s", "-inf", "+inf", "LIMIT", "1", "2"])),
            vec!["b", "c"]
        );
        let reply = run(&db, &["ZRANGEBYSCORE", "s", "1", "2", "WITHSCORES"]);
        assert_eq!(items(reply), vec!["a", "1", "b", "2"]);
        assert_eq!(
            run(&db, &["ZRANGEBYSCORE", "s", "1", "2", "BOGUS"]),
            Frame::syntax_err()
        );
    }

    #[test]
    fn zrevrangebyscore_takes_max_first() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(
            items(run(&db, &["ZREVRANGEBYSCORE", "s", "3", "1"])),
            vec!["c", "b", "a"]
        );
        assert_eq!(
            items(run(&db, &["ZREVRANGEBYSCORE", "s", "(3", "1"])),
            vec!["b", "a"]
        );
    }

    #[test]
    fn zrank_null_when_absent() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a"]);
        assert_eq!(run(&db, &["ZRANK", "s", "ghost"]), Frame::Null);
        assert_eq!(run(&db, &["ZRANK", "nope", "a"]), Frame::Null);
        assert_eq!(run(&db, &["ZREVRANK", "nope", "a"]), Frame::Null);
    }

    #[test]
    fn zrem_counts_removed() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b"]);
        assert_eq!(run(&db, &["ZREM", "s", "a", "ghost"]), Frame::Integer(1));
        assert_eq!(run(&db, &["ZREM", "s", "b"]), Frame::Integer(1));
        // removing the last member removes the key
        assert_eq!(run(&db, &["EXISTS", "s"]), Frame::Integer(0));
        assert_eq!(run(&db, &["ZREM", "nope", "a"]), Frame::Integer(0));
    }

    #[test]
    fn zremrangebyrank_clamps() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c", "4", "d"]);
        assert_eq!(run(&db, &["ZREMRANGEBYRANK", "s", "0", "1"]), Frame::Integer(2));
        assert_eq!(items(run(&db, &["ZRANGE", "s", "0", "-1"])), vec!["c", "d"]);
        assert_eq!(run(&db, &["ZREMRANGEBYRANK", "s", "5", "10"]), Frame::Integer(0));
        assert_eq!(run(&db, &["ZREMRANGEBYRANK", "s", "-2", "-1"]), Frame::Integer(2));
        assert_eq!(run(&db, &["EXISTS", "s"]), Frame::Integer(0));
    }

    #[test]
    fn zremrangebyscore_with_borders() {
        let db = db();
        run(&db, &["ZADD", "s", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(
            run(&db, &["ZREMRANGEBYSCORE", "s", "(1", "+inf"]),
            Frame::Integer(2)
        );
        assert_eq!(items(run(&db, &["ZRANGE", "s", "0", "-1"])), vec!["a"]);
    }

    #[test]
    fn wrong_type_against_string_key() {
        let db = db();
        run(&db, &["SET", "k", "v"]);
        assert_eq!(run(&db, &["ZADD", "k", "1", "a"]), Frame::wrong_type());
        assert_eq!(run(&db, &["ZRANGE", "k", "0", "-1"]), Frame::wrong_type());
    }
}
