//! Atomic EXEC: watched-version checks and optional undo-log rollback.
//!
//! EXEC takes every stripe lock the queued commands (and the watched
//! keys) need, in canonical order, and holds them for the whole batch.
//! Under `open_atomic_tx`, an undo log is captured before each write so
//! the first error rolls the batch back; otherwise errors are collected
//! like any other reply.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::{CmdLine, Frame};

use crate::db::registry::{key_str, lookup};
use crate::db::{Db, TxState};
use crate::marshal;

impl Db {
    /// Runs the queued transaction of `tx` against this database.
    /// The caller clears the MULTI flag and watches afterwards.
    pub fn exec_multi(self: &Arc<Self>, tx: &TxState) -> Frame {
        self.exec_multi_lines(&tx.queue, &tx.watching)
    }

    fn exec_multi_lines(
        self: &Arc<Self>,
        cmdlines: &[CmdLine],
        watching: &HashMap<String, u32>,
    ) -> Frame {
        // queue-time checks already validated syntax; plan the locks
        let mut write_keys = Vec::new();
        let mut read_keys = Vec::new();
        for cmdline in cmdlines {
            let name = String::from_utf8_lossy(&cmdline[0]).to_lowercase();
            let spec = lookup(&name).expect("queued commands are registered");
            let prepare = spec.prepare.expect("queued commands carry extractors");
            let (write, read) = prepare(&cmdline[1..]);
            write_keys.extend(write);
            read_keys.extend(read);
        }
        read_keys.extend(watching.keys().cloned());

        let _guard = self.locker.rw_locks(&write_keys, &read_keys);

        if self.version_changed(watching) {
            return Frame::Null;
        }

        let mut results: Vec<Frame> = Vec::with_capacity(cmdlines.len());
        let mut undo_logs: Vec<Vec<CmdLine>> = Vec::new();
        let mut aborted = false;

        for cmdline in cmdlines {
            let name = String::from_utf8_lossy(&cmdline[0]).to_lowercase();
            let spec = lookup(&name).expect("queued commands are registered");

            if self.atomic_tx && !spec.is_read_only() {
                let key = key_str(&cmdline[1]);
                undo_logs.push(self.undo_log(&key));
            }

            let reply = self.exec_with_lock(cmdline);
            if self.atomic_tx && reply.is_error() {
                // the failed command changed nothing; drop its undo log
                undo_logs.pop();
                aborted = true;
                break;
            }
            results.push(reply);
        }

        if self.atomic_tx && aborted {
            for undo_log in undo_logs.iter().rev() {
                for cmdline in undo_log {
                    self.exec_with_lock(cmdline);
                }
            }
            return Frame::err(
                "EXECABORT Transaction rollback because of errors during executing. \
                 (atomic tx is open)",
            );
        }

        if results.is_empty() {
            return Frame::empty_array();
        }

        self.add_version(&write_keys);
        Frame::Array(results)
    }

    /// Compares each watched version snapshot against the live counter.
    fn version_changed(&self, watching: &HashMap<String, u32>) -> bool {
        watching
            .iter()
            .any(|(key, &snapshot)| self.get_version(key) != snapshot)
    }

    /// Builds the command sequence that restores `key` to its current
    /// state: delete, reinstate the value, reinstate the TTL.
    pub(crate) fn undo_log(self: &Arc<Self>, key: &str) -> Vec<CmdLine> {
        let mut log: Vec<CmdLine> = Vec::with_capacity(3);
        log.push(to_cmdline(&["DEL", key]));

        let reinstate = self.get_entity_with(key, |entity| marshal::entity_to_cmdline(key, entity));
        if let Some(reinstate) = reinstate {
            log.push(reinstate);
            if let Some(at_ms) = self.expire_time(key) {
                log.push(marshal::expire_to_cmdline(key, at_ms));
            }
        }
        log
    }
}

fn to_cmdline(parts: &[&str]) -> CmdLine {
    parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect()
}
