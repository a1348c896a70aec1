//! String operations on the keyspace.

use std::time::Duration;

use bytes::Bytes;

use crate::types::{format_float, Value};

use super::{Db, FloatError, IntError, WrongType};

/// What SET should do with the key's expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetExpiry {
    /// Clear any existing TTL (plain SET).
    Discard,
    /// Keep the existing TTL (SET ... KEEPTTL).
    Keep,
    /// Set a new TTL.
    Ttl(Duration),
}

/// Result of a conditional SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The key was stored.
    Stored,
    /// NX/XX condition was not met; nothing changed.
    Blocked,
}

impl Db {
    /// Retrieves the string value for `key`, or `None` if missing or
    /// expired. Returns `Err(WrongType)` for non-string keys.
    pub fn get_string(&mut self, key: &str) -> Result<Option<Bytes>, WrongType> {
        match self.value(key) {
            Some(Value::Str(b)) => Ok(Some(b.clone())),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// Stores a string with optional NX/XX conditions.
    ///
    /// - `nx`: only set if the key does NOT already exist
    /// - `xx`: only set if the key DOES already exist
    ///
    /// SET is type-agnostic: it happily overwrites a list or hash.
    pub fn set_string(
        &mut self,
        key: &str,
        value: Bytes,
        expire: SetExpiry,
        nx: bool,
        xx: bool,
    ) -> SetOutcome {
        self.remove_if_expired(key);

        let key_exists = self.exists(key);
        if (nx && key_exists) || (xx && !key_exists) {
            return SetOutcome::Blocked;
        }

        let ttl = match expire {
            SetExpiry::Discard => None,
            SetExpiry::Keep => self.remaining_ttl(key),
            SetExpiry::Ttl(d) => Some(d),
        };

        if key_exists {
            self.del(key);
        }
        self.restore(key.to_owned(), Value::Str(value), ttl);
        SetOutcome::Stored
    }

    /// Removes and returns the string value of `key` (GETDEL).
    pub fn get_del(&mut self, key: &str) -> Result<Option<Bytes>, WrongType> {
        let old = self.get_string(key)?;
        if old.is_some() {
            self.del(key);
        }
        Ok(old)
    }

    /// Adds `delta` to the integer value of the key, creating it at 0
    /// if necessary. The existing TTL is preserved. Used by INCR, DECR,
    /// INCRBY, and DECRBY.
    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64, IntError> {
        let current = match self.get_string(key).map_err(|_| IntError::WrongType)? {
            Some(data) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(IntError::NotAnInteger)?,
            None => 0,
        };

        let new_val = current.checked_add(delta).ok_or(IntError::Overflow)?;
        self.set_string(
            key,
            Bytes::from(new_val.to_string()),
            SetExpiry::Keep,
            false,
            false,
        );
        Ok(new_val)
    }

    /// Adds a float `delta` to the value of the key, creating it at 0
    /// if necessary (INCRBYFLOAT). Returns the formatted new value.
    pub fn incr_by_float(&mut self, key: &str, delta: f64) -> Result<String, FloatError> {
        let current = match self.get_string(key).map_err(|_| FloatError::WrongType)? {
            Some(data) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or(FloatError::NotAFloat)?,
            None => 0.0,
        };

        let new_val = current + delta;
        if new_val.is_nan() || new_val.is_infinite() {
            return Err(FloatError::NanOrInfinity);
        }

        let formatted = format_float(new_val);
        self.set_string(
            key,
            Bytes::from(formatted.clone()),
            SetExpiry::Keep,
            false,
            false,
        );
        Ok(formatted)
    }

    /// Appends bytes to the string at `key`, creating it if missing.
    /// Returns the new length.
    pub fn append(&mut self, key: &str, value: &[u8]) -> Result<usize, WrongType> {
        let existing = self.get_string(key)?;
        let mut data = Vec::with_capacity(existing.as_ref().map_or(0, |b| b.len()) + value.len());
        if let Some(b) = &existing {
            data.extend_from_slice(b);
        }
        data.extend_from_slice(value);
        let len = data.len();
        self.set_string(key, Bytes::from(data), SetExpiry::Keep, false, false);
        Ok(len)
    }

    /// Returns the length of the string at `key`, 0 if missing.
    pub fn strlen(&mut self, key: &str) -> Result<usize, WrongType> {
        Ok(self.get_string(key)?.map_or(0, |b| b.len()))
    }

    /// Returns the substring from `start` to `end` inclusive, with
    /// Redis negative-index semantics (GETRANGE).
    pub fn get_range(&mut self, key: &str, start: i64, end: i64) -> Result<Bytes, WrongType> {
        let data = match self.get_string(key)? {
            Some(b) => b,
            None => return Ok(Bytes::new()),
        };
        let (s, e) = crate::types::normalize_range(start, end, data.len() as i64);
        if s > e {
            return Ok(Bytes::new());
        }
        Ok(data.slice(s as usize..(e as usize + 1)))
    }

    /// Overwrites part of the string at `key` starting at `offset`,
    /// zero-padding any gap (SETRANGE). Returns the new length.
    pub fn set_range(&mut self, key: &str, offset: usize, value: &[u8]) -> Result<usize, WrongType> {
        let existing = self.get_string(key)?.unwrap_or_default();
        let new_len = existing.len().max(offset + value.len());
        let mut data = Vec::with_capacity(new_len);
        data.extend_from_slice(&existing);
        data.resize(offset.max(existing.len()), 0);
        if offset < data.len() {
            let overlap = (data.len() - offset).min(value.len());
            data[offset..offset + overlap].copy_from_slice(&value[..overlap]);
            data.extend_from_slice(&value[overlap..]);
        } else {
            data.extend_from_slice(value);
        }
        let len = data.len();
        self.set_string(key, Bytes::from(data), SetExpiry::Keep, false, false);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn set_and_get() {
        let mut db = Db::new();
        assert_eq!(
            db.set_string("k", b("v"), SetExpiry::Discard, false, false),
            SetOutcome::Stored
        );
        assert_eq!(db.get_string("k").unwrap(), Some(b("v")));
    }

    #[test]
    fn get_missing() {
        let mut db = Db::new();
        assert_eq!(db.get_string("nope").unwrap(), None);
    }

    #[test]
    fn get_wrong_type() {
        let mut db = Db::new();
        db.list_push("l", vec![b("x")], true, false).unwrap();
        assert_eq!(db.get_string("l"), Err(WrongType));
    }

    #[test]
    fn set_nx_blocks_existing() {
        let mut db = Db::new();
        db.set_string("k", b("v1"), SetExpiry::Discard, false, false);
        assert_eq!(
            db.set_string("k", b("v2"), SetExpiry::Discard, true, false),
            SetOutcome::Blocked
        );
        assert_eq!(db.get_string("k").unwrap(), Some(b("v1")));
    }

    #[test]
    fn set_xx_blocks_missing() {
        let mut db = Db::new();
        assert_eq!(
            db.set_string("k", b("v"), SetExpiry::Discard, false, true),
            SetOutcome::Blocked
        );
        assert!(!db.exists("k"));
    }

    #[test]
    fn set_overwrites_other_type() {
        let mut db = Db::new();
        db.list_push("k", vec![b("x")], true, false).unwrap();
        db.set_string("k", b("v"), SetExpiry::Discard, false, false);
        assert_eq!(db.get_string("k").unwrap(), Some(b("v")));
    }

    #[test]
    fn plain_set_clears_ttl() {
        let mut db = Db::new();
        db.set_string(
            "k",
            b("v"),
            SetExpiry::Ttl(Duration::from_secs(100)),
            false,
            false,
        );
        db.set_string("k", b("v2"), SetExpiry::Discard, false, false);
        assert_eq!(db.ttl_secs("k"), super::super::TtlResult::NoExpiry);
    }

    #[test]
    fn keepttl_preserves_ttl() {
        let mut db = Db::new();
        db.set_string(
            "k",
            b("v"),
            SetExpiry::Ttl(Duration::from_secs(100)),
            false,
            false,
        );
        db.set_string("k", b("v2"), SetExpiry::Keep, false, false);
        assert!(matches!(
            db.ttl_secs("k"),
            super::super::TtlResult::Remaining(_)
        ));
    }

    #[test]
    fn get_del_removes() {
        let mut db = Db::new();
        db.set_string("k", b("v"), SetExpiry::Discard, false, false);
        assert_eq!(db.get_del("k").unwrap(), Some(b("v")));
        assert!(!db.exists("k"));
        assert_eq!(db.get_del("k").unwrap(), None);
    }

    #[test]
    fn incr_from_missing() {
        let mut db = Db::new();
        assert_eq!(db.incr_by("n", 1).unwrap(), 1);
        assert_eq!(db.incr_by("n", 1).unwrap(), 2);
        assert_eq!(db.incr_by("n", -5).unwrap(), -3);
    }

    #[test]
    fn incr_non_integer() {
        let mut db = Db::new();
        db.set_string("k", b("abc"), SetExpiry::Discard, false, false);
        assert_eq!(db.incr_by("k", 1), Err(IntError::NotAnInteger));
    }

    #[test]
    fn incr_overflow() {
        let mut db = Db::new();
        db.set_string(
            "k",
            b(&i64::MAX.to_string()),
            SetExpiry::Discard,
            false,
            false,
        );
        assert_eq!(db.incr_by("k", 1), Err(IntError::Overflow));
    }

    #[test]
    fn incr_preserves_ttl() {
        let mut db = Db::new();
        db.set_string(
            "n",
            b("5"),
            SetExpiry::Ttl(Duration::from_secs(100)),
            false,
            false,
        );
        db.incr_by("n", 1).unwrap();
        assert!(matches!(
            db.ttl_secs("n"),
            super::super::TtlResult::Remaining(_)
        ));
    }

    #[test]
    fn incr_by_float_formats() {
        let mut db = Db::new();
        assert_eq!(db.incr_by_float("f", 10.5).unwrap(), "10.5");
        assert_eq!(db.incr_by_float("f", 0.5).unwrap(), "11");
    }

    #[test]
    fn incr_by_float_rejects_nan_path() {
        let mut db = Db::new();
        db.incr_by_float("f", f64::MAX).unwrap();
        assert_eq!(
            db.incr_by_float("f", f64::MAX),
            Err(FloatError::NanOrInfinity)
        );
    }

    #[test]
    fn append_creates_and_extends() {
        let mut db = Db::new();
        assert_eq!(db.append("k", b"Hello").unwrap(), 5);
        assert_eq!(db.append("k", b" World").unwrap(), 11);
        assert_eq!(db.get_string("k").unwrap(), Some(b("Hello World")));
    }

    #[test]
    fn strlen_missing_is_zero() {
        let mut db = Db::new();
        assert_eq!(db.strlen("nope").unwrap(), 0);
        db.set_string("k", b("bar"), SetExpiry::Discard, false, false);
        assert_eq!(db.strlen("k").unwrap(), 3);
    }

    #[test]
    fn get_range_variants() {
        let mut db = Db::new();
        db.set_string("k", b("This is a string"), SetExpiry::Discard, false, false);
        assert_eq!(db.get_range("k", 0, 3).unwrap(), b("This"));
        assert_eq!(db.get_range("k", -3, -1).unwrap(), b("ing"));
        assert_eq!(db.get_range("k", 0, -1).unwrap(), b("This is a string"));
        assert_eq!(db.get_range("k", 10, 100).unwrap(), b("string"));
        assert_eq!(db.get_range("k", 5, 3).unwrap(), Bytes::new());
        assert_eq!(db.get_range("missing", 0, -1).unwrap(), Bytes::new());
    }

    #[test]
    fn set_range_overwrites() {
        let mut db = Db::new();
        db.set_string("k", b("Hello World"), SetExpiry::Discard, false, false);
        assert_eq!(db.set_range("k", 6, b"Redis").unwrap(), 11);
        assert_eq!(db.get_string("k").unwrap(), Some(b("Hello Redis")));
    }

    #[test]
    fn set_range_pads_with_zeros() {
        let mut db = Db::new();
        assert_eq!(db.set_range("k", 5, b"Hello").unwrap(), 10);
        let got = db.get_string("k").unwrap().unwrap();
        assert_eq!(&got[..5], &[0, 0, 0, 0, 0]);
        assert_eq!(&got[5..], b"Hello");
    }

    #[test]
    fn set_range_extends_past_end() {
        let mut db = Db::new();
        db.set_string("k", b("Hi"), SetExpiry::Discard, false, false);
        assert_eq!(db.set_range("k", 1, b"ello").unwrap(), 5);
        assert_eq!(db.get_string("k").unwrap(), Some(b("Hello")));
    }
}
