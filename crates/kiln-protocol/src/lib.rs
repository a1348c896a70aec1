//! kiln-protocol: RESP2 wire protocol implementation.
//!
//! Provides incremental parsing and direct-to-buffer serialization of the
//! RESP2 protocol spoken by Redis-compatible clients. Requests arrive as
//! arrays of bulk strings; a one-line inline form is accepted as a
//! fallback for hand-typed sessions.
//!
//! # quick start
//!
//! ```
//! use bytes::BytesMut;
//! use kiln_protocol::{Frame, parse_frame};
//!
//! // parse a simple string
//! let (frame, consumed) = parse_frame(b"+OK\r\n").unwrap().unwrap();
//! assert_eq!(frame, Frame::Simple("OK".into()));
//! assert_eq!(consumed, 5);
//!
//! // serialize a frame
//! let mut buf = BytesMut::new();
//! frame.serialize(&mut buf);
//! assert_eq!(&buf[..], b"+OK\r\n");
//! ```

pub mod error;
pub mod parse;
mod serialize;
pub mod types;

pub use error::ProtocolError;
pub use parse::{parse_frame, parse_frame_bytes};
pub use types::Frame;
