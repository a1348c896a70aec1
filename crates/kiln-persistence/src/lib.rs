//! kiln-persistence: the snapshot file format.
//!
//! A snapshot is a single self-describing file holding every database:
//!
//! ```text
//! [8B magic "KILNSNAP"][1B version]
//! per non-empty database:
//!   [0xFE][u32 db index]
//!   per entry:
//!     optional [0xFD][i64 remaining-ttl ms]
//!     [1B type tag][u32 key len][key][type-specific payload]
//! [0xFF]
//! [u64 CRC-64/XZ over all preceding bytes]
//! ```
//!
//! Multi-byte integers are little-endian. Writes go to a `.tmp` file
//! and are atomically renamed on completion, so a crashed snapshot
//! never corrupts the previous one. Reads fail closed: any malformed
//! magic, version, tag, count, or checksum aborts the restore.

pub mod format;
pub mod snapshot;

pub use format::FormatError;
pub use snapshot::{SnapEntry, SnapValue, SnapshotReader, SnapshotWriter, Record};
