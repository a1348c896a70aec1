//! Sorted-set operations on the keyspace.

use crate::glob::glob_match;
use crate::types::sorted_set::{ScoreBound, SortedSet, ZAddFlags};
use crate::types::Value;

use super::{Db, WrongType};

impl Db {
    /// Adds members with ZADD flag semantics, creating the sorted set
    /// if missing. Returns the number added, or added+updated when the
    /// CH flag is set.
    pub fn zset_add(
        &mut self,
        key: &str,
        flags: ZAddFlags,
        members: Vec<(f64, String)>,
    ) -> Result<usize, WrongType> {
        let zset = self.zset_entry(key)?;
        let mut count = 0;
        for (score, member) in members {
            let result = zset.add_with_flags(member, score, flags);
            if result.added || (flags.ch && result.updated) {
                count += 1;
            }
        }
        self.drop_if_empty(key);
        Ok(count)
    }

    /// ZADD ... INCR: increments one member's score under the same flag
    /// gating. Returns `None` when NX/XX/GT/LT blocked the update.
    pub fn zset_add_incr(
        &mut self,
        key: &str,
        flags: ZAddFlags,
        delta: f64,
        member: &str,
    ) -> Result<Option<f64>, WrongType> {
        let zset = self.zset_entry(key)?;

        // GT blocks when the new score would not be strictly greater
        // than the current one, LT when not strictly smaller; for an
        // increment that reduces to the sign of delta.
        let blocked = match zset.score(member) {
            Some(_) => flags.nx || (flags.gt && delta <= 0.0) || (flags.lt && delta >= 0.0),
            None => flags.xx,
        };

        if blocked {
            self.drop_if_empty(key);
            return Ok(None);
        }

        let new_score = zset.incr(member, delta);
        self.drop_if_empty(key);
        Ok(Some(new_score))
    }

    /// Removes members. Returns the number removed; deletes the key
    /// when the set empties.
    pub fn zset_rem(&mut self, key: &str, members: &[String]) -> Result<usize, WrongType> {
        let removed = match self.value_mut(key) {
            Some(Value::Zset(zset)) => members.iter().filter(|m| zset.remove(m)).count(),
            Some(_) => return Err(WrongType),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Returns the score of a member.
    pub fn zset_score(&mut self, key: &str, member: &str) -> Result<Option<f64>, WrongType> {
        match self.value(key) {
            Some(Value::Zset(zset)) => Ok(zset.score(member)),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// Returns the scores of several members.
    pub fn zset_mscore(
        &mut self,
        key: &str,
        members: &[String],
    ) -> Result<Vec<Option<f64>>, WrongType> {
        match self.value(key) {
            Some(Value::Zset(zset)) => Ok(members.iter().map(|m| zset.score(m)).collect()),
            Some(_) => Err(WrongType),
            None => Ok(vec![None; members.len()]),
        }
    }

    /// Returns the cardinality, 0 if missing.
    pub fn zset_card(&mut self, key: &str) -> Result<usize, WrongType> {
        match self.value(key) {
            Some(Value::Zset(zset)) => Ok(zset.len()),
            Some(_) => Err(WrongType),
            None => Ok(0),
        }
    }

    /// Returns the rank of a member, optionally from the high end.
    pub fn zset_rank(
        &mut self,
        key: &str,
        member: &str,
        rev: bool,
    ) -> Result<Option<usize>, WrongType> {
        match self.value(key) {
            Some(Value::Zset(zset)) => Ok(if rev {
                zset.rev_rank(member)
            } else {
                zset.rank(member)
            }),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// Returns members by rank range.
    pub fn zset_range_by_rank(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> Result<Vec<(String, f64)>, WrongType> {
        match self.value(key) {
            Some(Value::Zset(zset)) => Ok(zset.range_by_rank(start, stop, rev)),
            Some(_) => Err(WrongType),
            None => Ok(Vec::new()),
        }
    }

    /// Returns members by score range with LIMIT offset/count.
    #[allow(clippy::too_many_arguments)]
    pub fn zset_range_by_score(
        &mut self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        rev: bool,
        offset: usize,
        count: i64,
    ) -> Result<Vec<(String, f64)>, WrongType> {
        match self.value(key) {
            Some(Value::Zset(zset)) => Ok(zset.range_by_score(min, max, rev, offset, count)),
            Some(_) => Err(WrongType),
            None => Ok(Vec::new()),
        }
    }

    /// Counts members within a score range.
    pub fn zset_count(
        &mut self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> Result<usize, WrongType> {
        match self.value(key) {
            Some(Value::Zset(zset)) => Ok(zset.count_in_range(min, max)),
            Some(_) => Err(WrongType),
            None => Ok(0),
        }
    }

    /// Increments a member's score (ZINCRBY), creating set and member
    /// as needed. Returns the new score.
    pub fn zset_incr_by(&mut self, key: &str, delta: f64, member: &str) -> Result<f64, WrongType> {
        let zset = self.zset_entry(key)?;
        Ok(zset.incr(member, delta))
    }

    /// Removes and returns up to `count` members from the low or high
    /// end. Deletes the key when the set empties.
    pub fn zset_pop(
        &mut self,
        key: &str,
        max: bool,
        count: usize,
    ) -> Result<Vec<(String, f64)>, WrongType> {
        let popped = match self.value_mut(key) {
            Some(Value::Zset(zset)) => zset.pop(max, count),
            Some(_) => return Err(WrongType),
            None => Vec::new(),
        };
        self.drop_if_empty(key);
        Ok(popped)
    }

    /// Replaces `dst` with the given scored members (ZRANGESTORE).
    /// Deletes `dst` when empty. Returns the cardinality stored.
    pub fn zset_store(&mut self, dst: &str, members: Vec<(String, f64)>) -> usize {
        let len = members.len();
        self.del(dst);
        if !members.is_empty() {
            let mut zset = SortedSet::new();
            for (member, score) in members {
                zset.add(member, score);
            }
            self.insert(dst, Value::Zset(zset));
        }
        len
    }

    /// Incrementally iterates members with scores (ZSCAN).
    pub fn zset_scan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(u64, Vec<(String, f64)>), WrongType> {
        let zset = match self.value(key) {
            Some(Value::Zset(zset)) => zset,
            Some(_) => return Err(WrongType),
            None => return Ok((0, Vec::new())),
        };

        let target = if count == 0 { 10 } else { count };
        let mut out = Vec::new();
        let mut position = 0u64;

        for (member, score) in zset.iter() {
            if position < cursor {
                position += 1;
                continue;
            }
            position += 1;
            if let Some(pat) = pattern {
                if !glob_match(pat, member) {
                    continue;
                }
            }
            out.push((member.to_owned(), score));
            if out.len() >= target {
                return Ok((position, out));
            }
        }
        Ok((0, out))
    }

    /// Looks up the sorted set at `key`, creating an empty one when the
    /// key is missing.
    fn zset_entry(&mut self, key: &str) -> Result<&mut SortedSet, WrongType> {
        // insert first when missing so the borrow is uniform
        match self.value(key) {
            Some(Value::Zset(_)) => {}
            Some(_) => return Err(WrongType),
            None => self.insert(key, Value::Zset(SortedSet::new())),
        }
        match self.value_mut(key) {
            Some(Value::Zset(zset)) => Ok(zset),
            _ => Err(WrongType),
        }
    }
}
