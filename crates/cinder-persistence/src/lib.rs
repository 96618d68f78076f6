//! cinder-persistence: the append-only command log.
//!
//! Committed writes stream through a bounded channel to a single writer
//! thread, which serializes them as RESP arrays into the AOF. Replaying
//! the file from byte zero reconstructs the store; a background rewrite
//! compacts the file to one command per live key.

pub mod aof;
pub mod rewrite;

pub use aof::{FsyncPolicy, Persister};
