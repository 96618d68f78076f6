//! The AOF persister: append pipeline, fsync policy, load/replay.
//!
//! Writers hand committed command lines to [`Persister::save_cmdline`].
//! Under the `always` policy the write goes straight to disk on the
//! caller's thread; otherwise it enters a bounded channel drained by the
//! single writer thread. A full channel blocks the committing writer,
//! which bounds memory and preserves per-key command order.
//!
//! The file itself is a plain concatenation of RESP arrays. A `SELECT n`
//! line is emitted whenever the incoming payload's database differs from
//! the database the file is currently "in".

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use cinder_core::Store;
use cinder_protocol::{parse_frame, CmdLine, Frame};
use tracing::{error, info, warn};

/// Capacity of the payload channel; when full, committing writers block.
const AOF_QUEUE_SIZE: usize = 1 << 16;

/// When to force file contents to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// Fsync after every write; `save_cmdline` bypasses the channel.
    Always,
    /// A ticker fsyncs once per second.
    EverySec,
    /// Leave flushing to the OS.
    No,
}

struct Payload {
    db_index: usize,
    cmdline: CmdLine,
}

enum Message {
    Write(Payload),
    /// Drain marker: acknowledged once everything before it hit the file.
    Flush(SyncSender<()>),
}

/// The open AOF plus the database index its trailing commands apply to.
/// Guarded by `pausing_aof`, which the rewrite start/finish phases and
/// the every-second fsync also take.
struct AofFile {
    file: File,
    current_db: usize,
}

impl AofFile {
    fn write_payload(&mut self, payload: &Payload, fsync: FsyncPolicy) {
        if payload.db_index != self.current_db {
            let select = select_cmdline(payload.db_index);
            if let Err(e) = self.file.write_all(&Frame::from_cmdline(&select).to_bytes()) {
                warn!("aof select write failed: {e}");
                return;
            }
            self.current_db = payload.db_index;
        }

        if let Err(e) = self
            .file
            .write_all(&Frame::from_cmdline(&payload.cmdline).to_bytes())
        {
            warn!("aof write failed: {e}");
        }

        if fsync == FsyncPolicy::Always {
            if let Err(e) = self.file.sync_all() {
                error!("aof fsync failed: {e}");
            }
        }
    }
}

/// Single-writer append pipeline over one AOF.
pub struct Persister {
    store: Arc<Store>,
    filename: PathBuf,
    fsync: FsyncPolicy,
    tx: SyncSender<Message>,
    pub(crate) pausing_aof: Mutex<AofFileGuarded>,
    pub(crate) rewriting: AtomicBool,
}

// The rewrite module needs to reopen and retag the file under the lock.
pub(crate) struct AofFileGuarded {
    inner: AofFile,
}

impl AofFileGuarded {
    pub(crate) fn sync(&mut self) -> std::io::Result<()> {
        self.inner.file.sync_all()
    }

    pub(crate) fn replace_file(&mut self, file: File, current_db: usize) {
        self.inner.file = file;
        self.inner.current_db = current_db;
    }

    pub(crate) fn current_db(&self) -> usize {
        self.inner.current_db
    }

    pub(crate) fn append_select(&mut self, db_index: usize) -> std::io::Result<()> {
        let select = select_cmdline(db_index);
        self.inner
            .file
            .write_all(&Frame::from_cmdline(&select).to_bytes())
    }
}

impl Persister {
    /// Opens (creating if needed) the AOF at `filename`, optionally
    /// replaying it into `store` first, and starts the writer thread.
    ///
    /// Bind the store's AOF sinks to [`Persister::save_cmdline`] *after*
    /// construction so the replay itself is not re-appended.
    pub fn new(
        store: Arc<Store>,
        filename: impl Into<PathBuf>,
        load: bool,
        fsync: FsyncPolicy,
    ) -> std::io::Result<Arc<Self>> {
        let filename = filename.into();

        let mut loaded_db = 0;
        if load {
            loaded_db = replay_file(&filename, None, &store);
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        let (tx, rx) = sync_channel(AOF_QUEUE_SIZE);
        let persister = Arc::new(Self {
            store,
            filename,
            fsync,
            tx,
            pausing_aof: Mutex::new(AofFileGuarded {
                inner: AofFile {
                    file,
                    current_db: loaded_db,
                },
            }),
            rewriting: AtomicBool::new(false),
        });

        persister.spawn_writer(rx);
        if fsync == FsyncPolicy::EverySec {
            persister.spawn_fsync_ticker();
        }
        Ok(persister)
    }

    /// The multi-database store this persister loads into and rewrites
    /// from.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Path of the live AOF.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Queues one committed write for the given database.
    ///
    /// Under the `always` policy the write happens synchronously on the
    /// calling thread; otherwise it blocks only when the channel is full.
    pub fn save_cmdline(&self, db_index: usize, cmdline: &[Bytes]) {
        let payload = Payload {
            db_index,
            cmdline: cmdline.to_vec(),
        };

        if self.fsync == FsyncPolicy::Always {
            let mut guard = self.pausing_aof.lock().expect("aof mutex poisoned");
            guard.inner.write_payload(&payload, self.fsync);
            return;
        }

        if self.tx.send(Message::Write(payload)).is_err() {
            warn!("aof writer thread is gone; dropping command");
        }
    }

    /// Blocks until every previously queued payload reached the file.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = sync_channel(1);
        if self.tx.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    fn spawn_writer(self: &Arc<Self>, rx: Receiver<Message>) {
        let persister = Arc::clone(self);
        std::thread::Builder::new()
            .name("aof-writer".into())
            .spawn(move || {
                for message in rx {
                    match message {
                        Message::Write(payload) => {
                            let mut guard =
                                persister.pausing_aof.lock().expect("aof mutex poisoned");
                            guard.inner.write_payload(&payload, persister.fsync);
                        }
                        Message::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .expect("spawn aof writer");
    }

    fn spawn_fsync_ticker(self: &Arc<Self>) {
        let persister = Arc::downgrade(self);
        std::thread::Builder::new()
            .name("aof-fsync".into())
            .spawn(move || loop {
                std::thread::sleep(Duration::from_secs(1));
                let Some(persister) = persister.upgrade() else {
                    return;
                };
                let mut guard = persister.pausing_aof.lock().expect("aof mutex poisoned");
                if let Err(e) = guard.sync() {
                    error!("fsync failed: {e}");
                }
            })
            .expect("spawn aof fsync ticker");
    }
}

/// Builds `SELECT <i>`.
fn select_cmdline(db_index: usize) -> CmdLine {
    vec![
        Bytes::from_static(b"SELECT"),
        Bytes::from(db_index.to_string()),
    ]
}

/// Replays the AOF at `path` into `store`, optionally bounded to the
/// first `max_bytes` bytes. Returns the database index the file ended
/// in. A missing file is an empty log.
pub fn replay_file(path: &Path, max_bytes: Option<u64>, store: &Store) -> usize {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!("aof open failed: {e}");
            return 0;
        }
    };

    let mut raw = Vec::new();
    let read = match max_bytes {
        Some(limit) => file.take(limit).read_to_end(&mut raw),
        None => {
            let mut file = file;
            file.read_to_end(&mut raw)
        }
    };
    if let Err(e) = read {
        warn!("aof read failed: {e}");
        return 0;
    }

    let mut current_db = 0;
    let mut offset = 0;
    let mut replayed = 0u64;
    while offset < raw.len() {
        let (frame, consumed) = match parse_frame(&raw[offset..]) {
            Ok(Some(parsed)) => parsed,
            // a truncated trailing record (partial write at crash) is
            // expected; anything else is corruption worth logging
            Ok(None) => break,
            Err(e) => {
                error!("aof parse error at byte {offset}: {e}");
                break;
            }
        };
        offset += consumed;

        let Some(cmdline) = frame.into_cmdline() else {
            error!("aof record at byte {offset} is not a command array");
            continue;
        };

        if cmdline[0].eq_ignore_ascii_case(b"SELECT") {
            match std::str::from_utf8(&cmdline[1])
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
            {
                Some(index) if index < store.db_count() => current_db = index,
                _ => warn!("aof contains invalid SELECT, keeping db {current_db}"),
            }
            continue;
        }

        let db = store.db(current_db).expect("replay cursor validated");
        let reply = db.exec_normal(&cmdline);
        if reply.is_error() {
            warn!(
                "aof replay error for '{}': {reply:?}",
                String::from_utf8_lossy(&cmdline[0])
            );
        }
        replayed += 1;
    }

    info!(
        "aof replay finished: {replayed} commands from {}",
        path.display()
    );
    current_db
}
