//! Pub/sub hub: channel and pattern subscription registries with
//! fan-out.
//!
//! Subscribers are connection push queues keyed by session id. PUBLISH
//! is called by the dispatch layer while it holds the keyspace lock;
//! it only enqueues pre-encoded frames — the actual socket writes
//! happen later in each subscriber's own task, after the lock is gone.
//! A subscriber that disconnected mid-send is skipped silently.

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

use kiln_core::glob::glob_match;
use kiln_protocol::Frame;

/// Maximum allowed byte length for a pub/sub pattern. Longer patterns
/// only serve to force glob work on every PUBLISH.
const MAX_PATTERN_LEN: usize = 512;

type SubscriberMap = HashMap<u64, UnboundedSender<Bytes>>;

/// Process-wide subscription state, shared by all connections.
#[derive(Default)]
pub struct PubSubHub {
    /// Exact channel subscriptions: channel → subscriber push queues.
    channels: DashMap<String, SubscriberMap>,
    /// Pattern subscriptions: pattern → subscriber push queues.
    patterns: DashMap<String, SubscriberMap>,
}

impl PubSubHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session's push queue on an exact channel.
    pub fn subscribe(&self, channel: &str, session_id: u64, tx: UnboundedSender<Bytes>) {
        self.channels
            .entry(channel.to_owned())
            .or_default()
            .insert(session_id, tx);
    }

    /// Removes a session from an exact channel.
    pub fn unsubscribe(&self, channel: &str, session_id: u64) {
        if let Some(mut subs) = self.channels.get_mut(channel) {
            subs.remove(&session_id);
            let empty = subs.is_empty();
            drop(subs);
            if empty {
                self.channels.remove_if(channel, |_, subs| subs.is_empty());
            }
        }
    }

    /// Registers a session's push queue on a pattern. Returns `false`
    /// when the pattern exceeds [`MAX_PATTERN_LEN`].
    pub fn psubscribe(&self, pattern: &str, session_id: u64, tx: UnboundedSender<Bytes>) -> bool {
        if pattern.len() > MAX_PATTERN_LEN {
            return false;
        }
        self.patterns
            .entry(pattern.to_owned())
            .or_default()
            .insert(session_id, tx);
        true
    }

    /// Removes a session from a pattern.
    pub fn punsubscribe(&self, pattern: &str, session_id: u64) {
        if let Some(mut subs) = self.patterns.get_mut(pattern) {
            subs.remove(&session_id);
            let empty = subs.is_empty();
            drop(subs);
            if empty {
                self.patterns.remove_if(pattern, |_, subs| subs.is_empty());
            }
        }
    }

    /// Removes a session from everything it subscribed to. Called on
    /// disconnect.
    pub fn remove_session(
        &self,
        session_id: u64,
        channels: impl IntoIterator<Item = String>,
        patterns: impl IntoIterator<Item = String>,
    ) {
        for channel in channels {
            self.unsubscribe(&channel, session_id);
        }
        for pattern in patterns {
            self.punsubscribe(&pattern, session_id);
        }
    }

    /// Publishes a payload to a channel: `message` frames to exact
    /// subscribers, `pmessage` frames to every matching pattern's
    /// subscribers. Returns the number of queues the message reached.
    pub fn publish(&self, channel: &str, payload: &Bytes) -> usize {
        let mut count = 0;

        if let Some(subs) = self.channels.get(channel) {
            // one encoding shared by every exact subscriber
            let frame = encode_frame(&Frame::Array(vec![
                Frame::bulk("message"),
                Frame::bulk(channel.to_owned()),
                Frame::Bulk(payload.clone()),
            ]));
            for tx in subs.values() {
                if tx.send(frame.clone()).is_ok() {
                    count += 1;
                }
            }
        }

        for entry in self.patterns.iter() {
            let pattern = entry.key();
            if !glob_match(pattern, channel) {
                continue;
            }
            let frame = encode_frame(&Frame::Array(vec![
                Frame::bulk("pmessage"),
                Frame::bulk(pattern.to_owned()),
                Frame::bulk(channel.to_owned()),
                Frame::Bulk(payload.clone()),
            ]));
            for tx in entry.value().values() {
                if tx.send(frame.clone()).is_ok() {
                    count += 1;
                }
            }
        }

        count
    }

    /// Active channel names, optionally filtered by a glob pattern
    /// (PUBSUB CHANNELS).
    pub fn channel_names(&self, pattern: Option<&str>) -> Vec<String> {
        self.channels
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .filter(|name| match pattern {
                Some(pat) => glob_match(pat, name),
                None => true,
            })
            .collect()
    }

    /// Subscriber counts for the given channels (PUBSUB NUMSUB).
    pub fn numsub(&self, channels: &[String]) -> Vec<(String, usize)> {
        channels
            .iter()
            .map(|ch| {
                let count = self.channels.get(ch).map(|subs| subs.len()).unwrap_or(0);
                (ch.clone(), count)
            })
            .collect()
    }

    /// Number of distinct active patterns (PUBSUB NUMPAT).
    pub fn numpat(&self) -> usize {
        self.patterns.len()
    }
}

/// Serializes one frame to its wire form.
fn encode_frame(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::new();
    frame.serialize(&mut buf);
    buf.freeze()
}
