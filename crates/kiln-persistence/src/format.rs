//! Binary format helpers for the snapshot file.
//!
//! Length-prefixed encoding primitives, the CRC-64 checksum, and the
//! header constants. All multi-byte integers are little-endian.

use std::io::{self, Read, Write};

use crc::{Crc, CRC_64_XZ};
use thiserror::Error;

/// Magic bytes opening a snapshot file. Together with the version byte
/// this forms the 9-byte header.
pub const SNAP_MAGIC: &[u8; 8] = b"KILNSNAP";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Marker introducing a database section.
pub const OP_SELECT_DB: u8 = 0xFE;

/// Marker introducing an entry's expiration timestamp.
pub const OP_EXPIRE_MS: u8 = 0xFD;

/// Marker closing the entry stream; the checksum follows.
pub const OP_EOF: u8 = 0xFF;

/// Value type tags.
pub const TYPE_STRING: u8 = 0;
pub const TYPE_LIST: u8 = 1;
pub const TYPE_SET: u8 = 2;
pub const TYPE_HASH: u8 = 3;
pub const TYPE_ZSET: u8 = 4;

/// The checksum algorithm for the 8-byte trailer.
pub static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Maximum length accepted when reading a length-prefixed field.
/// 512 MiB is generous for any realistic key or value — a corrupt
/// length prefix must not cause a multi-gigabyte allocation.
pub const MAX_FIELD_LEN: usize = 512 * 1024 * 1024;

/// Maximum element count for persisted collections. Catches obviously
/// corrupt u32 counts before the reader loops over them.
pub const MAX_COLLECTION_COUNT: u32 = 100_000_000;

/// Errors that can occur when reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("crc64 mismatch (expected {expected:#018x}, got {actual:#018x})")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("unknown marker or type tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// write helpers
// ---------------------------------------------------------------------------

/// Writes a `u8`.
pub fn write_u8(w: &mut impl Write, val: u8) -> io::Result<()> {
    w.write_all(&[val])
}

/// Writes a `u32` in little-endian.
pub fn write_u32(w: &mut impl Write, val: u32) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes a `u64` in little-endian.
pub fn write_u64(w: &mut impl Write, val: u64) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes an `i64` in little-endian.
pub fn write_i64(w: &mut impl Write, val: i64) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes an `f64` in little-endian.
pub fn write_f64(w: &mut impl Write, val: f64) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes a length-prefixed byte slice: `[len: u32][data]`.
///
/// Returns an error if the data length exceeds `u32::MAX`.
pub fn write_bytes(w: &mut impl Write, data: &[u8]) -> io::Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("data length {} exceeds u32::MAX", data.len()),
        )
    })?;
    write_u32(w, len)?;
    w.write_all(data)
}

/// Writes a collection length as u32.
pub fn write_len(w: &mut impl Write, len: usize) -> io::Result<()> {
    let len = u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("collection length {len} exceeds u32::MAX"),
        )
    })?;
    write_u32(w, len)
}

// ---------------------------------------------------------------------------
// read helpers
// ---------------------------------------------------------------------------

/// Reads a `u8`.
pub fn read_u8(r: &mut impl Read) -> Result<u8, FormatError> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf)?;
    Ok(buf[0])
}

/// Reads a `u32` in little-endian.
pub fn read_u32(r: &mut impl Read) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a `u64` in little-endian.
pub fn read_u64(r: &mut impl Read) -> Result<u64, FormatError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads an `i64` in little-endian.
pub fn read_i64(r: &mut impl Read) -> Result<i64, FormatError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Reads an `f64` in little-endian.
pub fn read_f64(r: &mut impl Read) -> Result<f64, FormatError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Reads a length-prefixed byte vector, rejecting lengths above
/// [`MAX_FIELD_LEN`].
pub fn read_bytes(r: &mut impl Read) -> Result<Vec<u8>, FormatError> {
    let len = read_u32(r)? as usize;
    if len > MAX_FIELD_LEN {
        return Err(FormatError::InvalidData(format!(
            "field length {len} exceeds maximum of {MAX_FIELD_LEN}"
        )));
    }
    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf)?;
    Ok(buf)
}

/// Reads a length-prefixed UTF-8 string.
pub fn read_string(r: &mut impl Read) -> Result<String, FormatError> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes)
        .map_err(|_| FormatError::InvalidData("string field is not valid utf-8".into()))
}

/// Validates a deserialized collection count against
/// [`MAX_COLLECTION_COUNT`].
pub fn validate_collection_count(count: u32, label: &str) -> Result<(), FormatError> {
    if count > MAX_COLLECTION_COUNT {
        return Err(FormatError::InvalidData(format!(
            "{label} count {count} exceeds max {MAX_COLLECTION_COUNT}"
        )));
    }
    Ok(())
}

/// Caps pre-allocation from untrusted count fields. The loop still
/// iterates `count` times; this only limits the up-front reservation.
pub fn capped_capacity(count: u32) -> usize {
    (count as usize).min(65_536)
}

/// Reads exactly `buf.len()` bytes, mapping short reads to
/// `UnexpectedEof`.
fn read_exact(r: &mut impl Read, buf: &mut [u8]) -> Result<(), FormatError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::UnexpectedEof
        } else {
            FormatError::Io(e)
        }
    })
}

/// Writes the 9-byte file header.
pub fn write_header(w: &mut impl Write) -> io::Result<()> {
    w.write_all(SNAP_MAGIC)?;
    write_u8(w, FORMAT_VERSION)
}

/// Reads and validates the file header. Returns the format version.
pub fn read_header(r: &mut impl Read) -> Result<u8, FormatError> {
    let mut magic = [0u8; 8];
    read_exact(r, &mut magic)?;
    if &magic != SNAP_MAGIC {
        return Err(FormatError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version == 0 || version > FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    Ok(version)
}
