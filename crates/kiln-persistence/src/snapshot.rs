//! Snapshot writer and reader.
//!
//! The writer streams records into a `.tmp` file while folding every
//! byte into a running CRC-64, then atomically renames the file into
//! place after appending the checksum trailer. The reader mirrors the
//! process and verifies the trailer after the end marker; a mismatch
//! anywhere aborts the restore.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use crc::Digest;

use crate::format::{self, FormatError, CRC64};

/// The value stored in a snapshot entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapValue {
    /// A string value.
    Str(Bytes),
    /// A list of elements, head first.
    List(VecDeque<Bytes>),
    /// An unordered set of unique members.
    Set(HashSet<String>),
    /// A field → value mapping.
    Hash(HashMap<String, Bytes>),
    /// A sorted set as (score, member) pairs.
    Zset(Vec<(f64, String)>),
}

/// A single entry in a snapshot file.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapEntry {
    pub key: String,
    pub value: SnapValue,
    /// Remaining TTL in milliseconds, or -1 for no expiration.
    pub expire_ms: i64,
}

/// One record yielded by [`SnapshotReader::next_record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Subsequent entries belong to this database.
    SelectDb(u32),
    /// One key's data.
    Entry(SnapEntry),
}

/// Writes a complete snapshot to disk.
///
/// Records are written to a temporary file first and atomically renamed
/// to the final path by [`SnapshotWriter::finish`]. Dropping an
/// unfinished writer removes the temp file and leaves any previous
/// snapshot untouched.
pub struct SnapshotWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    /// Running checksum over every byte written so far.
    digest: Option<Digest<'static, u64>>,
    finished: bool,
}

impl SnapshotWriter {
    /// Creates a new snapshot writer and emits the header. The file
    /// won't appear at `path` until [`Self::finish`] succeeds.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, FormatError> {
        let final_path = path.into();
        let tmp_path = final_path.with_extension("snap.tmp");

        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let file = opts.open(&tmp_path)?;

        let mut this = Self {
            final_path,
            tmp_path,
            writer: BufWriter::new(file),
            digest: Some(CRC64.digest()),
            finished: false,
        };

        let mut header = Vec::with_capacity(9);
        format::write_header(&mut header)?;
        this.emit(&header)?;
        Ok(this)
    }

    /// Opens a database section. Entries written afterwards belong to
    /// database `index`.
    pub fn select_db(&mut self, index: u32) -> Result<(), FormatError> {
        let mut buf = Vec::with_capacity(5);
        format::write_u8(&mut buf, format::OP_SELECT_DB)?;
        format::write_u32(&mut buf, index)?;
        self.emit(&buf)
    }

    /// Writes a single entry.
    pub fn write_entry(&mut self, entry: &SnapEntry) -> Result<(), FormatError> {
        let mut buf = Vec::new();
        if entry.expire_ms >= 0 {
            format::write_u8(&mut buf, format::OP_EXPIRE_MS)?;
            format::write_i64(&mut buf, entry.expire_ms)?;
        }
        match &entry.value {
            SnapValue::Str(data) => {
                format::write_u8(&mut buf, format::TYPE_STRING)?;
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_bytes(&mut buf, data)?;
            }
            SnapValue::List(items) => {
                format::write_u8(&mut buf, format::TYPE_LIST)?;
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_len(&mut buf, items.len())?;
                for item in items {
                    format::write_bytes(&mut buf, item)?;
                }
            }
            SnapValue::Set(members) => {
                format::write_u8(&mut buf, format::TYPE_SET)?;
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_len(&mut buf, members.len())?;
                for member in members {
                    format::write_bytes(&mut buf, member.as_bytes())?;
                }
            }
            SnapValue::Hash(fields) => {
                format::write_u8(&mut buf, format::TYPE_HASH)?;
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_len(&mut buf, fields.len())?;
                for (field, value) in fields {
                    format::write_bytes(&mut buf, field.as_bytes())?;
                    format::write_bytes(&mut buf, value)?;
                }
            }
            SnapValue::Zset(members) => {
                format::write_u8(&mut buf, format::TYPE_ZSET)?;
                format::write_bytes(&mut buf, entry.key.as_bytes())?;
                format::write_len(&mut buf, members.len())?;
                for (score, member) in members {
                    format::write_f64(&mut buf, *score)?;
                    format::write_bytes(&mut buf, member.as_bytes())?;
                }
            }
        }
        self.emit(&buf)
    }

    /// Finalizes the snapshot: end marker, checksum trailer, fsync,
    /// atomic rename over the final path.
    pub fn finish(mut self) -> Result<(), FormatError> {
        self.emit(&[format::OP_EOF])?;

        let checksum = match self.digest.take() {
            Some(digest) => digest.finalize(),
            None => 0,
        };
        format::write_u64(&mut self.writer, checksum)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        fs::rename(&self.tmp_path, &self.final_path)?;
        self.finished = true;
        Ok(())
    }

    /// Writes bytes and folds them into the checksum.
    fn emit(&mut self, buf: &[u8]) -> Result<(), FormatError> {
        if let Some(digest) = self.digest.as_mut() {
            digest.update(buf);
        }
        self.writer.write_all(buf)?;
        Ok(())
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        if !self.finished {
            // best-effort cleanup of the incomplete temp file
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Reads records from a snapshot file, verifying the checksum trailer
/// once the end marker is reached.
pub struct SnapshotReader {
    reader: HashingReader<BufReader<File>>,
    done: bool,
}

impl SnapshotReader {
    /// Opens a snapshot file and validates the header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let file = File::open(path.as_ref())?;
        let mut reader = HashingReader {
            inner: BufReader::new(file),
            digest: Some(CRC64.digest()),
        };
        format::read_header(&mut reader)?;
        Ok(Self {
            reader,
            done: false,
        })
    }

    /// Reads the next record. Returns `Ok(None)` after the end marker
    /// has been reached and the checksum verified.
    pub fn next_record(&mut self) -> Result<Option<Record>, FormatError> {
        if self.done {
            return Ok(None);
        }

        let marker = format::read_u8(&mut self.reader)?;
        match marker {
            format::OP_SELECT_DB => {
                let index = format::read_u32(&mut self.reader)?;
                Ok(Some(Record::SelectDb(index)))
            }
            format::OP_EOF => {
                let actual = match self.reader.digest.take() {
                    Some(digest) => digest.finalize(),
                    None => 0,
                };
                // the stored trailer is outside the checksummed region
                let stored = format::read_u64(&mut self.reader.inner)?;
                if actual != stored {
                    return Err(FormatError::ChecksumMismatch {
                        expected: stored,
                        actual,
                    });
                }
                self.done = true;
                Ok(None)
            }
            format::OP_EXPIRE_MS => {
                let expire_ms = format::read_i64(&mut self.reader)?;
                let tag = format::read_u8(&mut self.reader)?;
                Ok(Some(Record::Entry(self.read_entry(tag, expire_ms)?)))
            }
            tag => Ok(Some(Record::Entry(self.read_entry(tag, -1)?))),
        }
    }

    fn read_entry(&mut self, tag: u8, expire_ms: i64) -> Result<SnapEntry, FormatError> {
        let r = &mut self.reader;
        let key = format::read_string(r)?;

        let value = match tag {
            format::TYPE_STRING => SnapValue::Str(Bytes::from(format::read_bytes(r)?)),
            format::TYPE_LIST => {
                let count = format::read_u32(r)?;
                format::validate_collection_count(count, "list")?;
                let mut items = VecDeque::with_capacity(format::capped_capacity(count));
                for _ in 0..count {
                    items.push_back(Bytes::from(format::read_bytes(r)?));
                }
                SnapValue::List(items)
            }
            format::TYPE_SET => {
                let count = format::read_u32(r)?;
                format::validate_collection_count(count, "set")?;
                let mut members = HashSet::with_capacity(format::capped_capacity(count));
                for _ in 0..count {
                    members.insert(format::read_string(r)?);
                }
                SnapValue::Set(members)
            }
            format::TYPE_HASH => {
                let count = format::read_u32(r)?;
                format::validate_collection_count(count, "hash")?;
                let mut fields = HashMap::with_capacity(format::capped_capacity(count));
                for _ in 0..count {
                    let field = format::read_string(r)?;
                    let value = Bytes::from(format::read_bytes(r)?);
                    fields.insert(field, value);
                }
                SnapValue::Hash(fields)
            }
            format::TYPE_ZSET => {
                let count = format::read_u32(r)?;
                format::validate_collection_count(count, "zset")?;
                let mut members = Vec::with_capacity(format::capped_capacity(count));
                for _ in 0..count {
                    let score = format::read_f64(r)?;
                    let member = format::read_string(r)?;
                    members.push((score, member));
                }
                SnapValue::Zset(members)
            }
            other => return Err(FormatError::UnknownTag(other)),
        };

        Ok(SnapEntry {
            key,
            value,
            expire_ms,
        })
    }
}

/// A reader that folds everything it yields into a CRC-64 digest.
struct HashingReader<R> {
    inner: R,
    digest: Option<Digest<'static, u64>>,
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(digest) = self.digest.as_mut() {
            digest.update(&buf[..n]);
        }
        Ok(n)
    }
}
