//! A single database: the key → entry mapping.
//!
//! A [`Db`] owns a flat `AHashMap<Box<str>, Entry>` and handles key
//! lookup, deletion, TTL management, iteration, and renaming. Expired
//! keys are removed lazily on access; the active expiration cycle in
//! [`crate::expiry`] sweeps the rest. Type-specific operations live in
//! the sibling modules, implemented directly on `Db`.

use std::time::Duration;

use ahash::AHashMap;
use rand::prelude::IteratorRandom;
use tracing::warn;

use crate::glob::glob_match;
use crate::time;
use crate::types::Value;

mod hash;
mod list;
mod set;
mod string;
mod zset;

pub use string::{SetExpiry, SetOutcome};

const WRONGTYPE_MSG: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Error returned when a command is used against a key holding the
/// wrong kind of value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{}", WRONGTYPE_MSG)]
pub struct WrongType;

/// Errors from integer arithmetic commands (INCR / DECR / HINCRBY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntError {
    #[error("{}", WRONGTYPE_MSG)]
    WrongType,
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR increment or decrement would overflow")]
    Overflow,
    /// HINCRBY against a hash field holding a non-integer value.
    #[error("ERR hash value is not an integer")]
    HashValueNotAnInteger,
}

/// Errors from float arithmetic commands (INCRBYFLOAT / HINCRBYFLOAT).
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum FloatError {
    #[error("{}", WRONGTYPE_MSG)]
    WrongType,
    #[error("ERR value is not a valid float")]
    NotAFloat,
    #[error("ERR increment would produce NaN or Infinity")]
    NanOrInfinity,
    #[error("ERR hash value is not a float")]
    HashValueNotAFloat,
}

/// Error returned when RENAME fails because the source doesn't exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RenameError {
    #[error("ERR no such key")]
    NoSuchKey,
}

/// Errors from LSET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListSetError {
    #[error("{}", WRONGTYPE_MSG)]
    WrongType,
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("ERR index out of range")]
    OutOfRange,
}

/// Result of a TTL query, matching Redis semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlResult {
    /// Key exists and has a TTL; remaining time in the unit queried.
    Remaining(u64),
    /// Key exists but has no expiration set.
    NoExpiry,
    /// Key does not exist.
    NotFound,
}

/// A single entry in the keyspace: a value plus optional expiration.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    /// Monotonic expiry timestamp in ms. 0 = no expiry.
    pub(crate) expires_at_ms: u64,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at_ms: time::expiry_from_duration(ttl),
        }
    }

    /// Returns `true` if this entry has passed its expiration time.
    fn is_expired(&self) -> bool {
        time::is_expired(self.expires_at_ms)
    }
}

/// One database of the keyspace.
///
/// All operations are single-threaded — the owning [`crate::Store`] is
/// guarded by the server's keyspace mutex. `Clone` exists for the
/// background snapshotter, which clones the store under the lock and
/// serializes the copy outside it; `Bytes` payloads make that a
/// structural copy sharing the underlying buffers.
#[derive(Debug, Default, Clone)]
pub struct Db {
    entries: AHashMap<Box<str>, Entry>,
    /// Number of entries that currently have an expiration set.
    expiry_count: usize,
    /// Cumulative count of keys removed by expiration (lazy + active).
    expired_total: u64,
}

impl Db {
    /// Creates a new, empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a key. Returns `true` if the key existed (and wasn't
    /// expired).
    pub fn del(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        if let Some(entry) = self.entries.remove(key) {
            self.decrement_expiry_if_set(&entry);
            true
        } else {
            false
        }
    }

    /// Returns `true` if the key exists and hasn't expired.
    pub fn exists(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        self.entries.contains_key(key)
    }

    /// Returns the type name of the value at `key`, or "none" if missing.
    pub fn value_type(&mut self, key: &str) -> &'static str {
        if self.remove_if_expired(key) {
            return "none";
        }
        match self.entries.get(key) {
            Some(e) => e.value.type_name(),
            None => "none",
        }
    }

    /// Sets an expiration `ms` milliseconds from now on an existing key.
    /// A non-positive `ms` deletes the key immediately (Redis EXPIRE
    /// with a time in the past). Returns `true` if the key existed.
    pub fn expire_in_ms(&mut self, key: &str, ms: i64) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        if !self.entries.contains_key(key) {
            return false;
        }
        if ms <= 0 {
            self.del(key);
            return true;
        }
        match self.entries.get_mut(key) {
            Some(entry) => {
                if entry.expires_at_ms == 0 {
                    self.expiry_count += 1;
                }
                entry.expires_at_ms = time::now_ms().saturating_add(ms as u64);
                true
            }
            None => false,
        }
    }

    /// Removes the expiration from a key.
    ///
    /// Returns `true` if the key existed and had a timeout that was
    /// removed.
    pub fn persist(&mut self, key: &str) -> bool {
        if self.remove_if_expired(key) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) if entry.expires_at_ms != 0 => {
                entry.expires_at_ms = 0;
                self.expiry_count = self.expiry_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Returns the TTL status for a key in seconds.
    pub fn ttl_secs(&mut self, key: &str) -> TtlResult {
        self.ttl_with(key, time::remaining_secs)
    }

    /// Returns the TTL status for a key in milliseconds.
    pub fn ttl_ms(&mut self, key: &str) -> TtlResult {
        self.ttl_with(key, time::remaining_ms)
    }

    fn ttl_with(&mut self, key: &str, remaining: fn(u64) -> Option<u64>) -> TtlResult {
        if self.remove_if_expired(key) {
            return TtlResult::NotFound;
        }
        match self.entries.get(key) {
            Some(entry) => match remaining(entry.expires_at_ms) {
                Some(n) => TtlResult::Remaining(n),
                None => TtlResult::NoExpiry,
            },
            None => TtlResult::NotFound,
        }
    }

    /// Returns all keys matching a glob pattern.
    ///
    /// Warning: O(n) scan of the entire database. Use SCAN for large
    /// keyspaces.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let len = self.entries.len();
        if len > 10_000 {
            warn!(key_count = len, "KEYS on large keyspace, consider SCAN");
        }
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| String::from(&**key))
            .collect()
    }

    /// Renames a key, overwriting any existing destination. The value
    /// and expiry move unchanged. Returns an error if the source key
    /// doesn't exist.
    pub fn rename(&mut self, key: &str, newkey: &str) -> Result<(), RenameError> {
        self.remove_if_expired(key);
        self.remove_if_expired(newkey);

        let entry = match self.entries.remove(key) {
            Some(entry) => entry,
            None => return Err(RenameError::NoSuchKey),
        };
        self.decrement_expiry_if_set(&entry);

        if let Some(old_dest) = self.entries.remove(newkey) {
            self.decrement_expiry_if_set(&old_dest);
        }

        if entry.expires_at_ms != 0 {
            self.expiry_count += 1;
        }
        self.entries.insert(Box::from(newkey), entry);
        Ok(())
    }

    /// Returns a uniformly random live key, or `None` if the database
    /// is empty.
    pub fn random_key(&self) -> Option<String> {
        let mut rng = rand::rng();
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .choose(&mut rng)
            .map(|(k, _)| String::from(&**k))
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the database has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys with an expiration set.
    pub fn expiry_count(&self) -> usize {
        self.expiry_count
    }

    /// Cumulative number of keys removed by expiration.
    pub fn expired_total(&self) -> u64 {
        self.expired_total
    }

    /// Removes all keys.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.expiry_count = 0;
    }

    /// Scans keys starting from a cursor position.
    ///
    /// The cursor is a position index into the map's iteration order:
    /// 0 starts a scan, and the returned cursor is 0 once the scan has
    /// visited every slot. Keys present for the whole scan on a stable
    /// map are visited at least once; duplicates are possible under
    /// concurrent mutation. `pattern` supports glob matching.
    pub fn scan_keys(&self, cursor: u64, count: usize, pattern: Option<&str>) -> (u64, Vec<String>) {
        let target = if count == 0 { 10 } else { count };
        let mut keys = Vec::with_capacity(target.min(128));
        let mut position = 0u64;

        for (key, entry) in self.entries.iter() {
            if position < cursor {
                position += 1;
                continue;
            }
            position += 1;

            if entry.is_expired() {
                continue;
            }
            if let Some(pat) = pattern {
                if !glob_match(pat, key) {
                    continue;
                }
            }

            keys.push(String::from(&**key));
            if keys.len() >= target {
                return (position, keys);
            }
        }

        (0, keys)
    }

    /// Iterates over all live entries, yielding the key, the value, and
    /// the remaining TTL in milliseconds (-1 for entries with no
    /// expiration). Used by the snapshotter and DEBUG introspection.
    pub fn iter_entries(&self) -> impl Iterator<Item = (&str, &Value, i64)> {
        self.entries.iter().filter_map(|(key, entry)| {
            if entry.is_expired() {
                return None;
            }
            let ttl_ms = match time::remaining_ms(entry.expires_at_ms) {
                Some(ms) => ms.min(i64::MAX as u64) as i64,
                None => -1,
            };
            Some((&**key, &entry.value, ttl_ms))
        })
    }

    /// Returns the value and remaining TTL in milliseconds for one key
    /// (-1 when no expiry). Used by DUMP and MEMORY USAGE.
    pub fn peek(&mut self, key: &str) -> Option<(&Value, i64)> {
        if self.remove_if_expired(key) {
            return None;
        }
        let entry = self.entries.get(key)?;
        let ttl_ms = match time::remaining_ms(entry.expires_at_ms) {
            Some(ms) => ms.min(i64::MAX as u64) as i64,
            None => -1,
        };
        Some((&entry.value, ttl_ms))
    }

    /// Restores an entry during snapshot recovery. `ttl` is the
    /// remaining time-to-live; `None` means no expiry. Normal writes go
    /// through the typed operations instead.
    pub fn restore(&mut self, key: String, value: Value, ttl: Option<Duration>) {
        if value.is_empty_collection() {
            return;
        }
        let replaced_expiring = self
            .entries
            .get(key.as_str())
            .is_some_and(|e| e.expires_at_ms != 0);
        if replaced_expiring {
            self.expiry_count = self.expiry_count.saturating_sub(1);
        }
        if ttl.is_some() {
            self.expiry_count += 1;
        }
        self.entries
            .insert(key.into_boxed_str(), Entry::new(value, ttl));
    }

    /// Randomly samples up to `count` keys that have an expiration set
    /// and removes any that have expired. Returns `(sampled, removed)`
    /// so the caller can apply the repeat-while-dirty rule.
    pub fn expire_sample(&mut self, count: usize) -> (usize, usize) {
        if self.expiry_count == 0 {
            return (0, 0);
        }

        let mut rng = rand::rng();
        let sampled: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at_ms != 0)
            .map(|(k, _)| k)
            .choose_multiple(&mut rng, count)
            .into_iter()
            .map(|k| String::from(&**k))
            .collect();

        let mut removed = 0;
        let total = sampled.len();
        for key in &sampled {
            if self.remove_if_expired(key) {
                removed += 1;
            }
        }
        (total, removed)
    }

    // -- internal helpers shared with the typed operation modules --

    /// Checks if a key is expired and removes it if so. Returns `true`
    /// if an expired entry was removed.
    pub(crate) fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.is_expired())
            .unwrap_or(false);

        if expired {
            if let Some(entry) = self.entries.remove(key) {
                self.decrement_expiry_if_set(&entry);
                self.expired_total += 1;
            }
        }
        expired
    }

    fn decrement_expiry_if_set(&mut self, entry: &Entry) {
        if entry.expires_at_ms != 0 {
            self.expiry_count = self.expiry_count.saturating_sub(1);
        }
    }

    /// Looks up a live entry's value.
    pub(crate) fn value(&mut self, key: &str) -> Option<&Value> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.entries.get(key).map(|e| &e.value)
    }

    /// Looks up a live entry's value mutably.
    pub(crate) fn value_mut(&mut self, key: &str) -> Option<&mut Value> {
        if self.remove_if_expired(key) {
            return None;
        }
        self.entries.get_mut(key).map(|e| &mut e.value)
    }

    /// Inserts a fresh entry with no expiry.
    pub(crate) fn insert(&mut self, key: &str, value: Value) {
        self.entries.insert(Box::from(key), Entry::new(value, None));
    }

    /// Removes the key when the mutation left its collection empty, so
    /// empty collections are never resident.
    pub(crate) fn drop_if_empty(&mut self, key: &str) {
        let empty = self
            .entries
            .get(key)
            .map(|e| e.value.is_empty_collection())
            .unwrap_or(false);
        if empty {
            if let Some(entry) = self.entries.remove(key) {
                self.decrement_expiry_if_set(&entry);
            }
        }
    }

    /// Remaining TTL of a live entry as a Duration, for operations that
    /// overwrite a value but keep its expiry.
    pub(crate) fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .and_then(|e| time::remaining_ms(e.expires_at_ms))
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::thread;

    fn set(db: &mut Db, key: &str, val: &str) {
        db.set_string(key, Bytes::copy_from_slice(val.as_bytes()), SetExpiry::Discard, false, false);
    }

    fn set_ttl(db: &mut Db, key: &str, val: &str, ttl: Duration) {
        db.set_string(
            key,
            Bytes::copy_from_slice(val.as_bytes()),
            SetExpiry::Ttl(ttl),
            false,
            false,
        );
    }

    #[test]
    fn del_existing() {
        let mut db = Db::new();
        set(&mut db, "key", "val");
        assert!(db.del("key"));
        assert!(!db.exists("key"));
    }

    #[test]
    fn del_missing() {
        let mut db = Db::new();
        assert!(!db.del("nope"));
    }

    #[test]
    fn exists_present_and_absent() {
        let mut db = Db::new();
        set(&mut db, "yes", "here");
        assert!(db.exists("yes"));
        assert!(!db.exists("no"));
    }

    #[test]
    fn ttl_no_expiry() {
        let mut db = Db::new();
        set(&mut db, "key", "val");
        assert_eq!(db.ttl_secs("key"), TtlResult::NoExpiry);
    }

    #[test]
    fn ttl_not_found() {
        let mut db = Db::new();
        assert_eq!(db.ttl_secs("missing"), TtlResult::NotFound);
    }

    #[test]
    fn ttl_with_expiry() {
        let mut db = Db::new();
        set_ttl(&mut db, "key", "val", Duration::from_secs(100));
        match db.ttl_secs("key") {
            TtlResult::Remaining(s) => assert!((98..=100).contains(&s)),
            other => panic!("expected Remaining, got {other:?}"),
        }
    }

    #[test]
    fn ttl_expired_key() {
        let mut db = Db::new();
        set_ttl(&mut db, "temp", "val", Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(db.ttl_secs("temp"), TtlResult::NotFound);
        // lazy removal also drops the expiry count
        assert_eq!(db.expiry_count(), 0);
    }

    #[test]
    fn expire_existing_key() {
        let mut db = Db::new();
        set(&mut db, "key", "val");
        assert!(db.expire_in_ms("key", 60_000));
        match db.ttl_secs("key") {
            TtlResult::Remaining(s) => assert!((58..=60).contains(&s)),
            other => panic!("expected Remaining, got {other:?}"),
        }
    }

    #[test]
    fn expire_missing_key() {
        let mut db = Db::new();
        assert!(!db.expire_in_ms("nope", 60_000));
    }

    #[test]
    fn expire_in_past_deletes() {
        let mut db = Db::new();
        set(&mut db, "key", "val");
        assert!(db.expire_in_ms("key", -5));
        assert!(!db.exists("key"));
    }

    #[test]
    fn persist_removes_ttl() {
        let mut db = Db::new();
        set_ttl(&mut db, "key", "val", Duration::from_secs(100));
        assert!(db.persist("key"));
        assert_eq!(db.ttl_secs("key"), TtlResult::NoExpiry);
        // no timeout to remove the second time
        assert!(!db.persist("key"));
    }

    #[test]
    fn rename_moves_value_and_ttl() {
        let mut db = Db::new();
        set_ttl(&mut db, "old", "val", Duration::from_secs(100));
        db.rename("old", "new").unwrap();
        assert!(!db.exists("old"));
        assert_eq!(
            db.get_string("new").unwrap(),
            Some(Bytes::from_static(b"val"))
        );
        assert!(matches!(db.ttl_secs("new"), TtlResult::Remaining(_)));
    }

    #[test]
    fn rename_missing_source() {
        let mut db = Db::new();
        assert_eq!(db.rename("ghost", "new"), Err(RenameError::NoSuchKey));
    }

    #[test]
    fn rename_overwrites_destination() {
        let mut db = Db::new();
        set(&mut db, "a", "1");
        set(&mut db, "b", "2");
        db.rename("a", "b").unwrap();
        assert_eq!(db.get_string("b").unwrap(), Some(Bytes::from_static(b"1")));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn keys_glob() {
        let mut db = Db::new();
        set(&mut db, "user:1", "a");
        set(&mut db, "user:2", "b");
        set(&mut db, "order:1", "c");

        let mut users = db.keys("user:*");
        users.sort();
        assert_eq!(users, vec!["user:1", "user:2"]);
        assert_eq!(db.keys("*").len(), 3);
        assert!(db.keys("nothing*").is_empty());
    }

    #[test]
    fn random_key_on_empty() {
        let db = Db::new();
        assert_eq!(db.random_key(), None);
    }

    #[test]
    fn random_key_returns_live_key() {
        let mut db = Db::new();
        set(&mut db, "only", "one");
        assert_eq!(db.random_key(), Some("only".to_string()));
    }

    #[test]
    fn scan_visits_all_keys() {
        let mut db = Db::new();
        for i in 0..25 {
            set(&mut db, &format!("key:{i}"), "v");
        }

        let mut seen = std::collections::HashSet::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys) = db.scan_keys(cursor, 7, None);
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn scan_with_pattern() {
        let mut db = Db::new();
        set(&mut db, "a:1", "v");
        set(&mut db, "a:2", "v");
        set(&mut db, "b:1", "v");

        let mut seen = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys) = db.scan_keys(cursor, 100, Some("a:*"));
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        seen.sort();
        assert_eq!(seen, vec!["a:1", "a:2"]);
    }

    #[test]
    fn expire_sample_removes_expired() {
        let mut db = Db::new();
        for i in 0..10 {
            set_ttl(&mut db, &format!("temp:{i}"), "gone", Duration::from_millis(5));
        }
        for i in 0..5 {
            set(&mut db, &format!("keep:{i}"), "stay");
        }

        thread::sleep(Duration::from_millis(20));

        let (sampled, removed) = db.expire_sample(20);
        assert_eq!(sampled, 10, "only keys with a TTL are sampled");
        assert_eq!(removed, 10);
        assert_eq!(db.len(), 5);
    }

    #[test]
    fn restore_skips_empty_collections() {
        let mut db = Db::new();
        db.restore("empty".into(), Value::List(Default::default()), None);
        assert!(!db.exists("empty"));
    }

    #[test]
    fn restore_with_ttl() {
        let mut db = Db::new();
        db.restore(
            "k".into(),
            Value::Str(Bytes::from_static(b"v")),
            Some(Duration::from_secs(50)),
        );
        assert!(matches!(db.ttl_secs("k"), TtlResult::Remaining(_)));
        assert_eq!(db.expiry_count(), 1);
    }
}
