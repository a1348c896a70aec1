//! Per-connection session state.

use std::collections::HashSet;

use bytes::Bytes;
use tokio::sync::mpsc;

/// State a connection carries between commands. Nothing here is
/// persisted; it dies with the socket.
pub struct Session {
    /// Connection identifier, unique for the process lifetime.
    pub id: u64,
    /// Current database index, set by SELECT. Starts at 0.
    pub db_index: usize,
    /// Name set by CLIENT SETNAME.
    pub name: Option<String>,
    /// Channels this session is subscribed to.
    pub channels: HashSet<String>,
    /// Patterns this session is subscribed to.
    pub patterns: HashSet<String>,
    /// Outbound push queue: pre-encoded pub/sub frames the connection
    /// task writes between replies.
    pub push_tx: mpsc::UnboundedSender<Bytes>,
    /// `true` between MULTI and EXEC/DISCARD.
    pub in_multi: bool,
    /// Commands queued by MULTI, stored raw (name first).
    pub queue: Vec<Vec<Bytes>>,
    /// Set when queuing failed; EXEC aborts the transaction.
    pub multi_error: bool,
    /// Set by QUIT and SHUTDOWN; the connection loop closes after the
    /// reply is flushed.
    pub should_close: bool,
}

impl Session {
    /// Creates a fresh session in database 0.
    pub fn new(id: u64, push_tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            id,
            db_index: 0,
            name: None,
            channels: HashSet::new(),
            patterns: HashSet::new(),
            push_tx,
            in_multi: false,
            queue: Vec::new(),
            multi_error: false,
            should_close: false,
        }
    }

    /// A session with at least one subscription is in subscribe mode
    /// and may only issue the pub/sub subset of commands.
    pub fn in_subscribe_mode(&self) -> bool {
        !self.channels.is_empty() || !self.patterns.is_empty()
    }

    /// Total number of subscriptions, the count reported in
    /// subscribe/unsubscribe confirmations.
    pub fn subscription_count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    /// Drops transaction state (DISCARD, EXEC, disconnect).
    pub fn reset_multi(&mut self) {
        self.in_multi = false;
        self.queue.clear();
        self.multi_error = false;
    }
}
