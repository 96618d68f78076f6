//! Background AOF rewrite: compaction with seamless tail splicing.
//!
//! The rewrite never blocks writers for its duration; only the brief
//! start and finish phases take `pausing_aof`:
//!
//! 1. **Start**: fsync, snapshot `(file_size, current_db)`, create the
//!    temp file.
//! 2. **Do** (unlocked): replay the first `file_size` bytes into a
//!    scratch store, then write one reproducing command per live key,
//!    with an unconditional `SELECT i` preamble per database and a
//!    `PEXPIREAT` per TTL.
//! 3. **Finish**: copy everything appended since the snapshot (the
//!    tail) into the temp file, restore the snapshot's database context
//!    ahead of the tail, atomically rename over the live file, reopen,
//!    and re-emit a `SELECT` so subsequent appends continue from a
//!    known database.
//!
//! Replaying the rewritten file yields the same logical state as
//! replaying the original.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use cinder_core::{marshal, Store};
use cinder_protocol::Frame;
use tracing::{error, info};

use crate::aof::{replay_file, Persister};

struct RewriteCtx {
    tmp_path: PathBuf,
    tmp: File,
    /// Live file size at snapshot time; bytes beyond it are the tail.
    file_size: u64,
    /// Database the live file was "in" at snapshot time.
    db_index: usize,
}

impl Persister {
    /// Returns whether a rewrite is currently in flight.
    pub fn is_rewriting(&self) -> bool {
        self.rewriting.load(Ordering::Acquire)
    }

    /// Runs a full rewrite, unless one is already running (returns
    /// `false` in that case). Errors abort the rewrite and leave the
    /// live AOF untouched.
    pub fn try_rewrite(self: &Arc<Self>) -> io::Result<bool> {
        if self
            .rewriting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }

        info!("aof rewrite started");
        let result = self.rewrite_inner();
        self.rewriting.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                info!("aof rewrite finished");
                Ok(true)
            }
            Err(e) => {
                error!("aof rewrite aborted: {e}");
                Err(e)
            }
        }
    }

    fn rewrite_inner(self: &Arc<Self>) -> io::Result<()> {
        let mut ctx = self.start_rewrite()?;
        self.do_rewrite(&mut ctx)?;
        let finish = self.finish_rewrite(&mut ctx);
        if finish.is_err() {
            let _ = std::fs::remove_file(&ctx.tmp_path);
        }
        finish
    }

    /// Briefly pauses appends to snapshot the file boundary.
    fn start_rewrite(&self) -> io::Result<RewriteCtx> {
        let mut guard = self.pausing_aof.lock().expect("aof mutex poisoned");
        guard.sync()?;

        let file_size = std::fs::metadata(self.filename())?.len();
        let tmp_path = self.filename().with_extension("rewrite");
        let tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(RewriteCtx {
            tmp_path,
            tmp,
            file_size,
            db_index: guard.current_db(),
        })
    }

    /// Reconstructs snapshot-time state in a scratch store and writes
    /// the compacted log. Appends continue to the live file meanwhile.
    fn do_rewrite(&self, ctx: &mut RewriteCtx) -> io::Result<()> {
        let scratch = Store::new(self.store().db_count(), false);
        replay_file(self.filename(), Some(ctx.file_size), &scratch);

        for i in 0..scratch.db_count() {
            // unconditional preamble: the temp file starts in no database
            let select = vec![
                bytes::Bytes::from_static(b"SELECT"),
                bytes::Bytes::from(i.to_string()),
            ];
            ctx.tmp.write_all(&Frame::from_cmdline(&select).to_bytes())?;

            let db = scratch.db(i).expect("scratch index in range");
            let mut write_err = None;
            db.for_each_entity(|key, entity, expire_at| {
                let line = marshal::entity_to_cmdline(key, entity);
                if let Err(e) = ctx.tmp.write_all(&Frame::from_cmdline(&line).to_bytes()) {
                    write_err = Some(e);
                    return false;
                }
                if let Some(at_ms) = expire_at {
                    let line = marshal::expire_to_cmdline(key, at_ms);
                    if let Err(e) = ctx.tmp.write_all(&Frame::from_cmdline(&line).to_bytes()) {
                        write_err = Some(e);
                        return false;
                    }
                }
                true
            });
            if let Some(e) = write_err {
                return Err(e);
            }
        }
        Ok(())
    }

    /// Splices the tail, swaps the files, and re-anchors the database
    /// context of the live log.
    fn finish_rewrite(&self, ctx: &mut RewriteCtx) -> io::Result<()> {
        let mut guard = self.pausing_aof.lock().expect("aof mutex poisoned");

        let mut live = File::open(self.filename())?;
        live.seek(SeekFrom::Start(ctx.file_size))?;

        // tail commands were appended while the file was "in" the
        // snapshot database; restore that context first
        let select = vec![
            bytes::Bytes::from_static(b"SELECT"),
            bytes::Bytes::from(ctx.db_index.to_string()),
        ];
        ctx.tmp.write_all(&Frame::from_cmdline(&select).to_bytes())?;
        io::copy(&mut live, &mut ctx.tmp)?;
        ctx.tmp.sync_all()?;

        std::fs::rename(&ctx.tmp_path, self.filename())?;

        let file = OpenOptions::new().append(true).open(self.filename())?;
        let current_db = guard.current_db();
        guard.replace_file(file, current_db);
        // make the trailing context explicit in the new file
        guard.append_select(current_db)?;
        Ok(())
    }
}
