//! Entity → command serialization.
//!
//! The AOF rewrite and the transaction undo log both need the minimal
//! command that reproduces a key's current value: `SET` for strings,
//! `RPUSH` for lists, `HSET` for hashes, `SADD` for sets, `ZADD` for
//! sorted sets, plus a `PEXPIREAT` when a TTL exists.

use bytes::Bytes;
use cinder_protocol::CmdLine;

use crate::types::DataEntity;

/// Shortest round-trip decimal form of a score.
pub fn format_score(score: f64) -> String {
    score.to_string()
}

/// Builds the command line that reproduces `entity` under `key`.
pub fn entity_to_cmdline(key: &str, entity: &DataEntity) -> CmdLine {
    match entity {
        DataEntity::Bytes(raw) => vec![
            Bytes::from_static(b"SET"),
            Bytes::copy_from_slice(key.as_bytes()),
            raw.clone(),
        ],
        DataEntity::List(list) => {
            let mut line = Vec::with_capacity(2 + list.len());
            line.push(Bytes::from_static(b"RPUSH"));
            line.push(Bytes::copy_from_slice(key.as_bytes()));
            list.for_each(|_, val| {
                line.push(val.clone());
                true
            });
            line
        }
        DataEntity::Hash(hash) => {
            let mut line = Vec::with_capacity(2 + 2 * hash.len());
            line.push(Bytes::from_static(b"HSET"));
            line.push(Bytes::copy_from_slice(key.as_bytes()));
            for (field, value) in hash {
                line.push(Bytes::copy_from_slice(field.as_bytes()));
                line.push(value.clone());
            }
            line
        }
        DataEntity::Set(set) => {
            let mut line = Vec::with_capacity(2 + set.len());
            line.push(Bytes::from_static(b"SADD"));
            line.push(Bytes::copy_from_slice(key.as_bytes()));
            for member in set {
                line.push(Bytes::copy_from_slice(member.as_bytes()));
            }
            line
        }
        DataEntity::SortedSet(zset) => {
            let mut line = Vec::with_capacity(2 + 2 * zset.len() as usize);
            line.push(Bytes::from_static(b"ZADD"));
            line.push(Bytes::copy_from_slice(key.as_bytes()));
            zset.for_each(0, zset.len(), false, |member, score| {
                line.push(Bytes::from(format_score(score)));
                line.push(Bytes::copy_from_slice(member.as_bytes()));
                true
            });
            line
        }
    }
}

/// Builds `PEXPIREAT key <ms>` for an absolute expiry.
pub fn expire_to_cmdline(key: &str, at_ms: u64) -> CmdLine {
    vec![
        Bytes::from_static(b"PEXPIREAT"),
        Bytes::copy_from_slice(key.as_bytes()),
        Bytes::from(at_ms.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::types::quicklist::QuickList;
    use crate::types::sorted_set::SortedSet;

    fn text(line: &CmdLine) -> Vec<String> {
        line.iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    #[test]
    fn string_marshals_to_set() {
        let entity = DataEntity::Bytes(Bytes::from_static(b"v"));
        assert_eq!(text(&entity_to_cmdline("k", &entity)), vec!["SET", "k", "v"]);
    }

    #[test]
    fn list_marshals_to_rpush_in_order() {
        let mut list = QuickList::new();
        list.push_back(Bytes::from_static(b"a"));
        list.push_back(Bytes::from_static(b"b"));
        let entity = DataEntity::List(list);
        assert_eq!(
            text(&entity_to_cmdline("l", &entity)),
            vec!["RPUSH", "l", "a", "b"]
        );
    }

    #[test]
    fn hash_marshals_to_hset_pairs() {
        let mut hash = HashMap::new();
        hash.insert("f".to_string(), Bytes::from_static(b"v"));
        let entity = DataEntity::Hash(hash);
        assert_eq!(
            text(&entity_to_cmdline("h", &entity)),
            vec!["HSET", "h", "f", "v"]
        );
    }

    #[test]
    fn set_marshals_to_sadd() {
        let mut set = HashSet::new();
        set.insert("m".to_string());
        let entity = DataEntity::Set(set);
        assert_eq!(text(&entity_to_cmdline("s", &entity)), vec!["SADD", "s", "m"]);
    }

    #[test]
    fn zset_marshals_scores_before_members() {
        let mut zset = SortedSet::new();
        zset.add("a", 1.0);
        zset.add("b", 2.5);
        let entity = DataEntity::SortedSet(zset);
        assert_eq!(
            text(&entity_to_cmdline("z", &entity)),
            vec!["ZADD", "z", "1", "a", "2.5", "b"]
        );
    }

    #[test]
    fn expire_cmdline_uses_milliseconds() {
        assert_eq!(
            text(&expire_to_cmdline("k", 1234)),
            vec!["PEXPIREAT", "k", "1234"]
        );
    }

    #[test]
    fn score_formatting_is_shortest_form() {
        assert_eq!(format_score(1.0), "1");
        assert_eq!(format_score(2.5), "2.5");
        assert_eq!(format_score(-0.75), "-0.75");
    }
}
