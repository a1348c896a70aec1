//! List operations on the keyspace.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::types::{normalize_range, Value};

use super::{Db, ListSetError, WrongType};

impl Db {
    /// Pushes values onto a list. `head` selects LPUSH vs RPUSH
    /// ordering; `require_existing` implements the X variants, which
    /// return `None` without creating a missing key. Returns the new
    /// list length.
    pub fn list_push(
        &mut self,
        key: &str,
        values: Vec<Bytes>,
        head: bool,
        require_existing: bool,
    ) -> Result<Option<usize>, WrongType> {
        match self.value_mut(key) {
            Some(Value::List(list)) => {
                for v in values {
                    if head {
                        list.push_front(v);
                    } else {
                        list.push_back(v);
                    }
                }
                Ok(Some(list.len()))
            }
            Some(_) => Err(WrongType),
            None if require_existing => Ok(None),
            None => {
                let mut list = VecDeque::with_capacity(values.len());
                for v in values {
                    if head {
                        list.push_front(v);
                    } else {
                        list.push_back(v);
                    }
                }
                let len = list.len();
                self.insert(key, Value::List(list));
                Ok(Some(len))
            }
        }
    }

    /// Pops up to `count` elements from the head or tail of a list.
    /// Returns `None` when the key is missing. Removes the key once the
    /// list empties.
    pub fn list_pop(
        &mut self,
        key: &str,
        head: bool,
        count: usize,
    ) -> Result<Option<Vec<Bytes>>, WrongType> {
        let popped = match self.value_mut(key) {
            Some(Value::List(list)) => {
                let mut out = Vec::with_capacity(count.min(list.len()));
                for _ in 0..count {
                    let item = if head {
                        list.pop_front()
                    } else {
                        list.pop_back()
                    };
                    match item {
                        Some(v) => out.push(v),
                        None => break,
                    }
                }
                Some(out)
            }
            Some(_) => return Err(WrongType),
            None => None,
        };
        self.drop_if_empty(key);
        Ok(popped)
    }

    /// Returns the length of the list, 0 if missing.
    pub fn list_len(&mut self, key: &str) -> Result<usize, WrongType> {
        match self.value(key) {
            Some(Value::List(list)) => Ok(list.len()),
            Some(_) => Err(WrongType),
            None => Ok(0),
        }
    }

    /// Returns list elements between `start` and `stop` inclusive, with
    /// negative-index semantics.
    pub fn list_range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>, WrongType> {
        match self.value(key) {
            Some(Value::List(list)) => {
                let (s, e) = normalize_range(start, stop, list.len() as i64);
                if s > e {
                    return Ok(Vec::new());
                }
                Ok(list
                    .iter()
                    .skip(s as usize)
                    .take((e - s + 1) as usize)
                    .cloned()
                    .collect())
            }
            Some(_) => Err(WrongType),
            None => Ok(Vec::new()),
        }
    }

    /// Returns the element at `index` (negative counts from the tail).
    pub fn list_index(&mut self, key: &str, index: i64) -> Result<Option<Bytes>, WrongType> {
        match self.value(key) {
            Some(Value::List(list)) => {
                let len = list.len() as i64;
                let idx = if index < 0 { len + index } else { index };
                if idx < 0 || idx >= len {
                    return Ok(None);
                }
                Ok(list.get(idx as usize).cloned())
            }
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// Replaces the element at `index` (LSET).
    pub fn list_set(&mut self, key: &str, index: i64, value: Bytes) -> Result<(), ListSetError> {
        match self.value_mut(key) {
            Some(Value::List(list)) => {
                let len = list.len() as i64;
                let idx = if index < 0 { len + index } else { index };
                if idx < 0 || idx >= len {
                    return Err(ListSetError::OutOfRange);
                }
                list[idx as usize] = value;
                Ok(())
            }
            Some(_) => Err(ListSetError::WrongType),
            None => Err(ListSetError::NoSuchKey),
        }
    }

    /// Inserts `value` before or after the first occurrence of `pivot`.
    /// Returns the new length, -1 if the pivot is absent, or 0 if the
    /// key is missing.
    pub fn list_insert(
        &mut self,
        key: &str,
        before: bool,
        pivot: &[u8],
        value: Bytes,
    ) -> Result<i64, WrongType> {
        match self.value_mut(key) {
            Some(Value::List(list)) => {
                let pos = list.iter().position(|e| e.as_ref() == pivot);
                match pos {
                    Some(i) => {
                        let at = if before { i } else { i + 1 };
                        list.insert(at, value);
                        Ok(list.len() as i64)
                    }
                    None => Ok(-1),
                }
            }
            Some(_) => Err(WrongType),
            None => Ok(0),
        }
    }

    /// Removes occurrences of `value` (LREM): `count > 0` removes from
    /// the head, `count < 0` from the tail, `count == 0` removes all.
    /// Returns the number removed.
    pub fn list_rem(&mut self, key: &str, count: i64, value: &[u8]) -> Result<usize, WrongType> {
        let removed = match self.value_mut(key) {
            Some(Value::List(list)) => {
                let limit = if count == 0 {
                    usize::MAX
                } else {
                    count.unsigned_abs() as usize
                };
                let mut removed = 0usize;

                if count >= 0 {
                    let mut kept = VecDeque::with_capacity(list.len());
                    for item in list.drain(..) {
                        if removed < limit && item.as_ref() == value {
                            removed += 1;
                        } else {
                            kept.push_back(item);
                        }
                    }
                    *list = kept;
                } else {
                    let mut kept = VecDeque::with_capacity(list.len());
                    while let Some(item) = list.pop_back() {
                        if removed < limit && item.as_ref() == value {
                            removed += 1;
                        } else {
                            kept.push_front(item);
                        }
                    }
                    *list = kept;
                }
                removed
            }
            Some(_) => return Err(WrongType),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Trims the list to the inclusive range (LTRIM). Deletes the key
    /// when the range is empty.
    pub fn list_trim(&mut self, key: &str, start: i64, stop: i64) -> Result<(), WrongType> {
        match self.value_mut(key) {
            Some(Value::List(list)) => {
                let (s, e) = normalize_range(start, stop, list.len() as i64);
                if s > e {
                    list.clear();
                } else {
                    list.truncate(e as usize + 1);
                    list.drain(..s as usize);
                }
            }
            Some(_) => return Err(WrongType),
            None => return Ok(()),
        }
        self.drop_if_empty(key);
        Ok(())
    }

    /// Atomically moves one element from `src` to `dst` (LMOVE /
    /// RPOPLPUSH). `from_head`/`to_head` select the ends. Returns the
    /// moved element, or `None` when the source is empty.
    pub fn list_move(
        &mut self,
        src: &str,
        dst: &str,
        from_head: bool,
        to_head: bool,
    ) -> Result<Option<Bytes>, WrongType> {
        // type-check the destination before popping the source
        match self.value(dst) {
            Some(Value::List(_)) | None => {}
            Some(_) => return Err(WrongType),
        }

        let elem = match self.list_pop(src, from_head, 1)? {
            Some(mut v) if !v.is_empty() => v.remove(0),
            _ => return Ok(None),
        };

        self.list_push(dst, vec![elem.clone()], to_head, false)?;
        Ok(Some(elem))
    }

    /// Finds positions of `element` (LPOS). `rank` selects which match
    /// to start from (negative searches from the tail); `num_matches`
    /// of 0 means all matches. Returns at most `num_matches` indices.
    pub fn list_pos(
        &mut self,
        key: &str,
        element: &[u8],
        rank: i64,
        num_matches: usize,
        max_len: usize,
    ) -> Result<Vec<usize>, WrongType> {
        let list = match self.value(key) {
            Some(Value::List(list)) => list,
            Some(_) => return Err(WrongType),
            None => return Ok(Vec::new()),
        };

        let limit = if num_matches == 0 {
            usize::MAX
        } else {
            num_matches
        };
        let scan_cap = if max_len == 0 { usize::MAX } else { max_len };
        let mut skip = rank.unsigned_abs().saturating_sub(1) as usize;
        let mut out = Vec::new();

        if rank >= 0 {
            for (i, item) in list.iter().enumerate().take(scan_cap) {
                if item.as_ref() == element {
                    if skip > 0 {
                        skip -= 1;
                        continue;
                    }
                    out.push(i);
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        } else {
            let len = list.len();
            for (back, item) in list.iter().rev().enumerate().take(scan_cap) {
                if item.as_ref() == element {
                    if skip > 0 {
                        skip -= 1;
                        continue;
                    }
                    out.push(len - 1 - back);
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }
}
