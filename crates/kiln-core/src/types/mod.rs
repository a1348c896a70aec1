//! Data type representations for stored values.

pub mod sorted_set;

use std::collections::VecDeque;

use ahash::AHashMap;
use bytes::Bytes;

use sorted_set::SortedSet;

use std::collections::HashSet;

/// A stored value in the keyspace.
///
/// Each variant maps to one of the five supported kinds. `PartialEq` is
/// implemented manually because `SortedSet` compares by ordered content.
#[derive(Debug, Clone)]
pub enum Value {
    /// Binary-safe string data. `Bytes` gives cheap clones and
    /// zero-copy slicing.
    Str(Bytes),

    /// Ordered list of binary-safe elements. `VecDeque` gives O(1)
    /// push/pop at both ends.
    List(VecDeque<Bytes>),

    /// Unordered collection of unique members.
    Set(HashSet<String>),

    /// Field → value mapping with no ordering guarantee.
    Hash(AHashMap<String, Bytes>),

    /// Sorted set of unique members ordered by (score, member).
    Zset(SortedSet),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Zset(a), Value::Zset(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((m1, s1), (m2, s2))| m1 == m2 && s1 == s2)
            }
            _ => false,
        }
    }
}

impl Value {
    /// Returns the type name, matching Redis TYPE command output.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::Zset(_) => "zset",
        }
    }

    /// Returns `true` for collection values that have become empty and
    /// must therefore be removed from the keyspace.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Zset(z) => z.is_empty(),
        }
    }

    /// Rough per-value memory estimate in bytes, used by MEMORY USAGE
    /// and the INFO used_memory line. Accounts for payload bytes plus a
    /// flat per-element container overhead.
    pub fn estimated_size(&self) -> usize {
        const ELEMENT_OVERHEAD: usize = 48;
        match self {
            Value::Str(b) => b.len(),
            Value::List(l) => l.iter().map(|e| e.len() + ELEMENT_OVERHEAD).sum(),
            Value::Set(s) => s.iter().map(|m| m.len() + ELEMENT_OVERHEAD).sum(),
            Value::Hash(h) => h
                .iter()
                .map(|(f, v)| f.len() + v.len() + ELEMENT_OVERHEAD)
                .sum(),
            Value::Zset(z) => z
                .iter()
                .map(|(m, _)| m.len() * 2 + 8 + ELEMENT_OVERHEAD * 2)
                .sum(),
        }
    }
}

/// Converts Redis-style indices (supporting negative values) to a
/// clamped `(start, stop)` pair.
///
/// Negative indices count back from `len` (e.g. -1 = last element).
/// Out-of-bounds stop is clamped to `len - 1`; out-of-bounds negative
/// stop clamps to -1 so the caller sees `start > stop` (empty range).
/// Returns `(0, -1)` for empty collections.
pub fn normalize_range(start: i64, stop: i64, len: i64) -> (i64, i64) {
    if len == 0 {
        return (0, -1);
    }

    // resolve negative indices, clamp floor to 0
    let s = if start < 0 {
        (len + start).max(0)
    } else {
        start
    };

    // resolve negative indices, clamp floor to -1 so that a
    // hugely-negative stop produces an empty range
    let e = if stop < 0 {
        (len + stop).max(-1)
    } else {
        stop.min(len - 1)
    };

    (s, e)
}

/// Formats a float value matching Redis behavior: whole numbers render
/// without a decimal point, everything else uses the shortest
/// round-tripping representation.
pub fn format_float(val: f64) -> String {
    if val == val.trunc() && val >= i64::MIN as f64 && val <= i64::MAX as f64 {
        format!("{}", val as i64)
    } else {
        format!("{val}")
    }
}
