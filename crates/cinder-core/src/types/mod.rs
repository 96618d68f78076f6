//! Data type representations for stored values.
//!
//! Each variant maps to one of the server's value types. Containers hold
//! binary-safe `Bytes` payloads (hash fields and set members are string
//! keys); every command narrows the variant first and answers the
//! wrong-type error on a mismatch.

pub mod quicklist;
pub mod sorted_set;

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

pub use quicklist::QuickList;
pub use sorted_set::{Element, ScoreBorder, SortedSet};

/// A stored value in the keyspace.
#[derive(Debug, Clone)]
pub enum DataEntity {
    /// Binary-safe string data.
    Bytes(Bytes),

    /// Paged list of binary-safe elements.
    List(QuickList),

    /// Field→value map.
    Hash(HashMap<String, Bytes>),

    /// Set of unique string members.
    Set(HashSet<String>),

    /// Score-ordered set with ranking.
    SortedSet(SortedSet),
}

impl DataEntity {
    /// Returns the type name, matching the TYPE command vocabulary.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataEntity::Bytes(_) => "string",
            DataEntity::List(_) => "list",
            DataEntity::Hash(_) => "hash",
            DataEntity::Set(_) => "set",
            DataEntity::SortedSet(_) => "zset",
        }
    }
}
