//! Protocol error types for RESP2 parsing.

use thiserror::Error;

/// Errors that can occur when parsing the RESP2 wire format.
///
/// Everything except [`ProtocolError::Incomplete`] is fatal for the
/// connection: the server replies with a protocol error and closes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input buffer doesn't contain a complete frame yet.
    /// The caller should read more data and try again.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// Failed to parse an integer where the protocol requires one
    /// (frame lengths, `:` payloads).
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or array declared a negative length other than the
    /// `-1` nil sentinel.
    #[error("invalid frame length: {0}")]
    InvalidLength(i64),

    /// A bulk string declared a length above the configured cap.
    #[error("bulk string of {0} bytes exceeds maximum")]
    BulkTooLarge(i64),

    /// An array declared more elements than the configured cap.
    #[error("array of {0} elements exceeds maximum")]
    TooManyElements(i64),

    /// Arrays nested beyond the depth cap.
    #[error("frames nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// A simple string, error, or inline command contained bytes that are
    /// not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A bulk string payload was not followed by CRLF.
    #[error("missing CRLF after bulk string")]
    MissingCrlf,

    /// An inline command had unbalanced quotes.
    #[error("unbalanced quotes in inline command")]
    UnbalancedQuotes,
}
