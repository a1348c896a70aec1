//! RESP2 frame types.
//!
//! The [`Frame`] enum represents a single parsed RESP2 value. Bulk
//! strings use `Bytes` for reference-counted storage that avoids copies
//! when values move between the keyspace and the wire.

use bytes::Bytes;

/// A single RESP2 protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string reply, e.g. `+OK\r\n`.
    /// Used for short, non-binary status replies.
    Simple(String),

    /// Error reply, e.g. `-ERR unknown command\r\n`. The payload carries
    /// the category prefix (`ERR`, `WRONGTYPE`, ...) followed by the
    /// message, all on one line.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Null bulk string, `$-1\r\n`. The RESP2 "nil" reply.
    NullBulk,

    /// Ordered array of frames, e.g. `*2\r\n:1\r\n:2\r\n`.
    Array(Vec<Frame>),

    /// Null array, `*-1\r\n`. Returned by probes on empty sources.
    NullArray,
}

impl Frame {
    /// Shorthand for `Frame::Simple("OK")`.
    pub fn ok() -> Frame {
        Frame::Simple("OK".into())
    }

    /// Builds a bulk frame from anything convertible to `Bytes`.
    pub fn bulk(data: impl Into<Bytes>) -> Frame {
        Frame::Bulk(data.into())
    }

    /// Builds an error frame, prefixing `ERR ` when the message has no
    /// category token of its own.
    pub fn error(msg: impl Into<String>) -> Frame {
        let msg = msg.into();
        let has_prefix = msg
            .split_whitespace()
            .next()
            .is_some_and(|tok| tok.chars().all(|c| c.is_ascii_uppercase()));
        if has_prefix {
            Frame::Error(msg)
        } else {
            Frame::Error(format!("ERR {msg}"))
        }
    }

    /// Returns `true` for either RESP2 nil form.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::NullBulk | Frame::NullArray)
    }
}
