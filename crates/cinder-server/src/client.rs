//! Per-client state.
//!
//! A connection is split in two: the [`ClientHandle`], shared with the
//! pub/sub hub so channel workers can push frames at any time, and the
//! [`Session`], owned exclusively by the connection task (selected
//! database, auth, transaction state).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use cinder_core::TxState;
use cinder_protocol::Frame;
use tokio::sync::mpsc;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// The shareable half of a connection: an identity, an outbound frame
/// queue, and the set of subscribed channel names.
pub struct ClientHandle {
    id: u64,
    out: mpsc::UnboundedSender<Bytes>,
    subs: Mutex<HashSet<String>>,
}

impl ClientHandle {
    /// Creates a handle and the receiver its connection task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (out, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            out,
            subs: Mutex::new(HashSet::new()),
        };
        (handle, rx)
    }

    /// Stable identity for subscriber bookkeeping.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues a frame for delivery; a gone connection is ignored.
    pub fn send_frame(&self, frame: &Frame) {
        let mut buf = BytesMut::new();
        frame.serialize(&mut buf);
        let _ = self.out.send(buf.freeze());
    }

    /// Records a subscription. Returns the new subscription total.
    pub fn add_subscription(&self, channel: &str) -> usize {
        let mut subs = self.subs.lock().expect("subs poisoned");
        subs.insert(channel.to_owned());
        subs.len()
    }

    /// Drops a subscription. Returns the new subscription total.
    pub fn remove_subscription(&self, channel: &str) -> usize {
        let mut subs = self.subs.lock().expect("subs poisoned");
        subs.remove(channel);
        subs.len()
    }

    /// Snapshot of the channels this client is subscribed to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subs
            .lock()
            .expect("subs poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

/// The connection-task-owned half: database selection, auth, and the
/// MULTI/WATCH state.
#[derive(Default)]
pub struct Session {
    pub db_index: usize,
    pub authenticated: bool,
    pub tx: TxState,
}
