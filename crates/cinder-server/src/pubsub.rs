//! Pub/sub hub: one channel object per topic, each with its own
//! fan-out worker.
//!
//! Publishing enqueues onto the topic's bounded message queue (dropped
//! when nobody listens); the worker drains it and writes a framed
//! `message` push to every current subscriber. Delivery is best-effort.
//! A channel with no subscribers left is destroyed; dropping its
//! sender ends the worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use cinder_protocol::Frame;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::ClientHandle;

/// Buffered messages per topic before publishers feel back-pressure.
const CHANNEL_QUEUE: usize = 1024;

struct Channel {
    tx: mpsc::Sender<Bytes>,
    subscribers: Arc<Mutex<HashMap<u64, Arc<ClientHandle>>>>,
}

/// Topic registry shared by every connection.
pub struct PubSub {
    channels: DashMap<String, Channel>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribes the client to each named topic, acknowledging every
    /// one with its new subscription total.
    pub fn subscribe(&self, client: &Arc<ClientHandle>, names: &[String]) {
        for name in names {
            if name.is_empty() {
                continue;
            }
            let entry = self
                .channels
                .entry(name.clone())
                .or_insert_with(|| spawn_channel(name.clone()));
            entry
                .subscribers
                .lock()
                .expect("subscribers poisoned")
                .insert(client.id(), Arc::clone(client));

            let count = client.add_subscription(name);
            client.send_frame(&ack_frame("subscribe", name, count));
        }
    }

    /// Unsubscribes the client from the named topics (or, with an empty
    /// list, from everything it is subscribed to), acknowledging each.
    /// Emptied channels are destroyed.
    pub fn unsubscribe(&self, client: &Arc<ClientHandle>, names: &[String]) {
        let names: Vec<String> = if names.is_empty() {
            client.subscriptions()
        } else {
            names.to_vec()
        };

        for name in &names {
            let mut emptied = false;
            if let Some(channel) = self.channels.get(name) {
                let mut subs = channel.subscribers.lock().expect("subscribers poisoned");
                subs.remove(&client.id());
                emptied = subs.is_empty();
            }
            if emptied {
                self.channels.remove(name);
                debug!(channel = %name, "pubsub channel destroyed");
            }

            let count = client.remove_subscription(name);
            client.send_frame(&ack_frame("unsubscribe", name, count));
        }
    }

    /// Publishes a payload to a topic. Returns the number of
    /// subscribers the message was fanned out to (0 when the topic has
    /// no channel).
    pub async fn publish(&self, name: &str, payload: Bytes) -> usize {
        let (tx, count) = {
            let Some(channel) = self.channels.get(name) else {
                return 0;
            };
            let count = channel
                .subscribers
                .lock()
                .expect("subscribers poisoned")
                .len();
            (channel.tx.clone(), count)
        };
        if count == 0 {
            return 0;
        }
        // bounded queue: a flooded topic applies back-pressure here
        let _ = tx.send(payload).await;
        count
    }

    /// Active topic names, optionally filtered by a glob pattern.
    pub fn channel_names(&self, pattern: Option<&str>) -> Vec<String> {
        self.channels
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| match pattern {
                Some(pat) => glob_match(pat, name),
                None => true,
            })
            .collect()
    }

    /// `(channel, subscriber_count)` for each queried channel.
    pub fn numsub(&self, names: &[String]) -> Vec<(String, usize)> {
        names
            .iter()
            .map(|name| {
                let count = self
                    .channels
                    .get(name)
                    .map(|c| c.subscribers.lock().expect("subscribers poisoned").len())
                    .unwrap_or(0);
                (name.clone(), count)
            })
            .collect()
    }
}

/// Creates the channel object and its fan-out worker task.
fn spawn_channel(name: String) -> Channel {
    let (tx, mut rx) = mpsc::channel::<Bytes>(CHANNEL_QUEUE);
    let subscribers: Arc<Mutex<HashMap<u64, Arc<ClientHandle>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let worker_subs = Arc::clone(&subscribers);
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let targets: Vec<Arc<ClientHandle>> = {
                let subs = worker_subs.lock().expect("subscribers poisoned");
                subs.values().cloned().collect()
            };
            let frame = message_frame(&name, &payload);
            for client in targets {
                client.send_frame(&frame);
            }
        }
    });

    Channel { tx, subscribers }
}

/// `*3 message <topic> <payload>`.
fn message_frame(topic: &str, payload: &Bytes) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from_static(b"message")),
        Frame::Bulk(Bytes::copy_from_slice(topic.as_bytes())),
        Frame::Bulk(payload.clone()),
    ])
}

/// `*3 subscribe|unsubscribe <topic> :<count>`.
fn ack_frame(kind: &'static str, topic: &str, count: usize) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from_static(kind.as_bytes())),
        Frame::Bulk(Bytes::copy_from_slice(topic.as_bytes())),
        Frame::Integer(count as i64),
    ])
}

/// Simple glob matching for channel-name filters.
///
/// Supports `*`, `?`, `[abc]` (with `^` negation and `a-z` ranges), and
/// `\` escapes. Matching is byte-wise; all metacharacters are ASCII so
/// byte comparison is unambiguous.
pub(crate) fn glob_match(pattern: &str, input: &str) -> bool {
    glob_match_inner(pattern.as_bytes(), input.as_bytes())
}

/// Inner backtracking matcher: tracks the last `*` in both pattern and
/// input, rewinding to that checkpoint on mismatch.
fn glob_match_inner(pat: &[u8], inp: &[u8]) -> bool {
    let (mut pi, mut ii) = (0, 0);
    let (mut star_pi, mut star_ii) = (usize::MAX, usize::MAX);

    while ii < inp.len() {
        if pi < pat.len() && pat[pi] == b'\\' && pi + 1 < pat.len() {
            // escaped character, must match literally
            pi += 1;
            if inp[ii] == pat[pi] {
                pi += 1;
                ii += 1;
                continue;
            }
        } else if pi < pat.len() && pat[pi] == b'?' {
            pi += 1;
            ii += 1;
            continue;
        } else if pi < pat.len() && pat[pi] == b'*' {
            star_pi = pi;
            star_ii = ii;
            pi += 1;
            continue;
        } else if pi < pat.len() && pat[pi] == b'[' {
            if let Some((matched, end)) = match_char_class(&pat[pi..], inp[ii]) {
                if matched {
                    pi += end;
                    ii += 1;
                    continue;
                }
            }
        } else if pi < pat.len() && pat[pi] == inp[ii] {
            pi += 1;
            ii += 1;
            continue;
        }

        // no match; backtrack to the last star if there was one
        if star_pi != usize::MAX {
            pi = star_pi + 1;
            star_ii += 1;
            ii = star_ii;
            continue;
        }

        return false;
    }

    while pi < pat.len() && pat[pi] == b'*' {
        pi += 1;
    }

    pi == pat.len()
}

/// Matches a `[...]` class against one byte. Returns
/// `(matched, bytes_consumed)` for a well-formed bracket.
fn match_char_class(pat: &[u8], ch: u8) -> Option<(bool, usize)> {
    if pat.is_empty() || pat[0] != b'[' {
        return None;
    }

    let mut i = 1;
    let negate = if i < pat.len() && pat[i] == b'^' {
        i += 1;
        true
    } else {
        false
    };

    let mut matched = false;
    while i < pat.len() && pat[i] != b']' {
        if i + 2 < pat.len() && pat[i + 1] == b'-' {
            if ch >= pat[i] && ch <= pat[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if ch == pat[i] {
                matched = true;
            }
            i += 1;
        }
    }

    if i < pat.len() && pat[i] == b']' {
        Some((matched ^ negate, i + 1))
    } else {
        None // unterminated bracket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{timeout, Duration};

    fn new_client() -> (Arc<ClientHandle>, UnboundedReceiver<Bytes>) {
        let (handle, rx) = ClientHandle::new();
        (Arc::new(handle), rx)
    }

    async fn recv(rx: &mut UnboundedReceiver<Bytes>) -> Bytes {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[test]
    fn glob_basics() {
        assert!(glob_match("hello", "hello"));
        assert!(!glob_match("hello", "world"));
        assert!(glob_match("news.*", "news.sports"));
        assert!(!glob_match("news.*", "old.news"));
        assert!(glob_match("h?llo", "hallo"));
        assert!(glob_match("h[ae]llo", "hello"));
        assert!(!glob_match("h[^ae]llo", "hello"));
        assert!(glob_match("hello\\*", "hello*"));
        assert!(glob_match("*", "anything"));
    }

    #[tokio::test]
    async fn subscribe_acks_with_count() {
        let hub = PubSub::new();
        let (client, mut rx) = new_client();
        hub.subscribe(&client, &["a".into(), "b".into()]);

        assert_eq!(
            recv(&mut rx).await,
            Bytes::from_static(b"*3\r\n$9\r\nsubscribe\r\n$1\r\na\r\n:1\r\n")
        );
        assert_eq!(
            recv(&mut rx).await,
            Bytes::from_static(b"*3\r\n$9\r\nsubscribe\r\n$1\r\nb\r\n:2\r\n")
        );
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let hub = PubSub::new();
        let (client, mut rx) = new_client();
        hub.subscribe(&client, &["news".into()]);
        let _ack = recv(&mut rx).await;

        let count = hub.publish("news", Bytes::from_static(b"hi")).await;
        assert_eq!(count, 1);
        assert_eq!(
            recv(&mut rx).await,
            Bytes::from_static(b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n")
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_drops() {
        let hub = PubSub::new();
        assert_eq!(hub.publish("void", Bytes::from_static(b"x")).await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_destroys_empty_channel() {
        let hub = PubSub::new();
        let (client, mut rx) = new_client();
        hub.subscribe(&client, &["ch".into()]);
        let _ack = recv(&mut rx).await;
        assert_eq!(hub.channel_names(None), vec!["ch".to_string()]);

        hub.unsubscribe(&client, &["ch".into()]);
        assert_eq!(
            recv(&mut rx).await,
            Bytes::from_static(b"*3\r\n$11\r\nunsubscribe\r\n$2\r\nch\r\n:0\r\n")
        );
        assert!(hub.channel_names(None).is_empty());
        assert_eq!(hub.publish("ch", Bytes::from_static(b"x")).await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_all_on_disconnect() {
        let hub = PubSub::new();
        let (client, _rx) = new_client();
        hub.subscribe(&client, &["a".into(), "b".into()]);

        hub.unsubscribe(&client, &[]);
        assert!(hub.channel_names(None).is_empty());
        assert!(client.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn fanout_covers_every_subscriber() {
        let hub = PubSub::new();
        let (alice, mut rx_a) = new_client();
        let (bob, mut rx_b) = new_client();
        hub.subscribe(&alice, &["room".into()]);
        hub.subscribe(&bob, &["room".into()]);
        let _ = recv(&mut rx_a).await;
        let _ = recv(&mut rx_b).await;

        let count = hub.publish("room", Bytes::from_static(b"hey")).await;
        assert_eq!(count, 2);
        assert!(recv(&mut rx_a).await.ends_with(b"hey\r\n"));
        assert!(recv(&mut rx_b).await.ends_with(b"hey\r\n"));
    }

    #[tokio::test]
    async fn numsub_and_channel_filtering() {
        let hub = PubSub::new();
        let (client, _rx) = new_client();
        hub.subscribe(&client, &["news.sports".into(), "news.tech".into(), "misc".into()]);

        let mut filtered = hub.channel_names(Some("news.*"));
        filtered.sort();
        assert_eq!(filtered, vec!["news.sports", "news.tech"]);

        let counts = hub.numsub(&["news.tech".into(), "ghost".into()]);
        assert_eq!(counts[0], ("news.tech".to_string(), 1));
        assert_eq!(counts[1], ("ghost".to_string(), 0));
    }
}
