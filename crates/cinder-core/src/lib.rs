//! cinder-core: the storage engine.
//!
//! Owns the keyspace, data types, expiration, and the command machinery.
//! Designed around fine-grained locking: every key hashes to a stripe of
//! its database's lock table, and commands declare the keys they read and
//! write so multi-key operations can take all stripes in canonical order.

pub mod commands;
pub mod db;
pub mod dict;
pub mod error;
pub mod lock;
pub mod marshal;
pub mod store;
pub mod time;
pub mod timewheel;
pub mod types;

pub use db::{Db, TxState};
pub use dict::ConcurrentDict;
pub use error::CoreError;
pub use lock::LockTable;
pub use store::Store;
pub use types::DataEntity;
