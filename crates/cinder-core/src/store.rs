//! The multi-database store: one `Db` per logical index.

use std::sync::Arc;

use bytes::Bytes;

use crate::db::Db;
use crate::error::CoreError;

const DEFAULT_DATABASES: usize = 16;

/// A fixed set of logical databases addressable by index.
pub struct Store {
    dbs: Vec<Arc<Db>>,
}

impl Store {
    /// Creates `databases` empty databases (16 when zero is given).
    pub fn new(databases: usize, atomic_tx: bool) -> Self {
        let databases = if databases == 0 {
            DEFAULT_DATABASES
        } else {
            databases
        };
        let dbs = (0..databases)
            .map(|i| Arc::new(Db::new(i, atomic_tx)))
            .collect();
        Self { dbs }
    }

    /// Number of logical databases.
    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    /// The database at `index`, or an error reply-worthy failure.
    pub fn db(&self, index: usize) -> Result<&Arc<Db>, CoreError> {
        self.dbs.get(index).ok_or(CoreError::BadDbIndex)
    }

    /// Installs one AOF sink across every database. The sink receives
    /// `(db_index, cmdline)` for each committed write.
    pub fn set_add_aof(&self, sink: impl Fn(usize, &[Bytes]) + Send + Sync + 'static) {
        let sink = Arc::new(sink);
        for db in &self.dbs {
            let sink = Arc::clone(&sink);
            let index = db.index();
            db.set_add_aof(Arc::new(move |line: &[Bytes]| sink(index, line)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_databases_falls_back_to_default() {
        assert_eq!(Store::new(0, false).db_count(), 16);
        assert_eq!(Store::new(4, false).db_count(), 4);
    }

    #[test]
    fn db_lookup_bounds() {
        let store = Store::new(2, false);
        assert!(store.db(0).is_ok());
        assert!(store.db(1).is_ok());
        assert_eq!(store.db(2).unwrap_err(), CoreError::BadDbIndex);
    }

    #[test]
    fn databases_are_independent() {
        use cinder_protocol::Frame;
        let store = Store::new(2, false);
        let line: Vec<Bytes> = ["SET", "k", "zero"]
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect();
        store.db(0).unwrap().exec_normal(&line);

        let get: Vec<Bytes> = ["GET", "k"]
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect();
        assert_eq!(
            store.db(0).unwrap().exec_normal(&get),
            Frame::Bulk(Bytes::from_static(b"zero"))
        );
        assert_eq!(store.db(1).unwrap().exec_normal(&get), Frame::Null);
    }
}
