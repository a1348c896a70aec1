//! Sorted set data structure: dual-indexed by score and member.
//!
//! Each member has a unique name and an associated `f64` score. Members
//! are ordered by (score, member) — ties in score are broken
//! lexicographically, matching Redis semantics.
//!
//! Implementation uses a `BTreeMap<(OrderedFloat<f64>, String), ()>` for
//! ordered iteration and a `HashMap<String, OrderedFloat<f64>>` for O(1)
//! member→score lookups. An order-statistic structure over the same
//! ordering; rank walks the tree (O(n)), inserts and removals stay
//! O(log n).

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use ordered_float::OrderedFloat;

/// Flags that control ZADD behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZAddFlags {
    /// Only add new members, don't update existing scores.
    pub nx: bool,
    /// Only update existing members, don't add new ones.
    pub xx: bool,
    /// Only update when new score > current score.
    pub gt: bool,
    /// Only update when new score < current score.
    pub lt: bool,
    /// Count changed members (added + updated) instead of just added.
    pub ch: bool,
}

/// Result of a single ZADD member operation.
#[derive(Debug, Clone, Copy)]
pub struct AddResult {
    /// Whether a new member was added.
    pub added: bool,
    /// Whether an existing member's score was changed.
    pub updated: bool,
}

impl AddResult {
    /// No change: member was neither added nor updated.
    pub const UNCHANGED: Self = Self {
        added: false,
        updated: false,
    };
}

/// One endpoint of a score interval, as given to ZRANGEBYSCORE / ZCOUNT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    /// `-inf`
    NegInf,
    /// `+inf` / `inf`
    PosInf,
    /// A plain number: endpoint included.
    Incl(f64),
    /// `(number`: endpoint excluded.
    Excl(f64),
}

impl ScoreBound {
    /// Returns `true` if `score` is at-or-above this bound when used as
    /// a minimum.
    fn allows_as_min(&self, score: f64) -> bool {
        match *self {
            ScoreBound::NegInf => true,
            ScoreBound::PosInf => false,
            ScoreBound::Incl(v) => score >= v,
            ScoreBound::Excl(v) => score > v,
        }
    }

    /// Returns `true` if `score` is at-or-below this bound when used as
    /// a maximum.
    fn allows_as_max(&self, score: f64) -> bool {
        match *self {
            ScoreBound::NegInf => false,
            ScoreBound::PosInf => true,
            ScoreBound::Incl(v) => score <= v,
            ScoreBound::Excl(v) => score < v,
        }
    }

    /// The score value to start ordered iteration from when this bound
    /// is the minimum.
    fn start_score(&self) -> f64 {
        match *self {
            ScoreBound::NegInf => f64::NEG_INFINITY,
            ScoreBound::PosInf => f64::INFINITY,
            ScoreBound::Incl(v) | ScoreBound::Excl(v) => v,
        }
    }
}

impl FromStr for ScoreBound {
    type Err = ();

    /// Parses a score bound: `-inf`, `+inf`, `inf`, `3.5`, or `(3.5`.
    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "-inf" | "-INF" => return Ok(ScoreBound::NegInf),
            "inf" | "+inf" | "INF" | "+INF" => return Ok(ScoreBound::PosInf),
            _ => {}
        }
        if let Some(rest) = s.strip_prefix('(') {
            let v: f64 = rest.parse().map_err(|_| ())?;
            if v.is_nan() {
                return Err(());
            }
            return Ok(ScoreBound::Excl(v));
        }
        let v: f64 = s.parse().map_err(|_| ())?;
        if v.is_nan() {
            return Err(());
        }
        Ok(ScoreBound::Incl(v))
    }
}

/// A sorted set of unique string members, each with a floating-point
/// score. Rank is position in (score, member) order, 0-based, lowest
/// score first.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    /// Score→member index for ordered iteration.
    tree: BTreeMap<(OrderedFloat<f64>, String), ()>,
    /// Member→score index for O(1) lookups.
    scores: HashMap<String, OrderedFloat<f64>>,
}

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or updates a member with the given score.
    pub fn add(&mut self, member: String, score: f64) -> AddResult {
        self.add_with_flags(member, score, ZAddFlags::default())
    }

    /// Adds or updates a member with ZADD flag semantics.
    pub fn add_with_flags(&mut self, member: String, score: f64, flags: ZAddFlags) -> AddResult {
        let new_score = OrderedFloat(score);

        if let Some(&old_score) = self.scores.get(&member) {
            // member exists — skip if any flag condition blocks the update
            if flags.nx
                || (flags.gt && new_score <= old_score)
                || (flags.lt && new_score >= old_score)
                || new_score == old_score
            {
                return AddResult::UNCHANGED;
            }
            self.tree.remove(&(old_score, member.clone()));
            self.scores.insert(member.clone(), new_score);
            self.tree.insert((new_score, member), ());
            AddResult {
                added: false,
                updated: true,
            }
        } else {
            // new member — XX means only update, so skip
            if flags.xx {
                return AddResult::UNCHANGED;
            }
            self.scores.insert(member.clone(), new_score);
            self.tree.insert((new_score, member), ());
            AddResult {
                added: true,
                updated: false,
            }
        }
    }

    /// Removes a member. Returns `true` if it existed.
    pub fn remove(&mut self, member: &str) -> bool {
        if let Some(score) = self.scores.remove(member) {
            self.tree.remove(&(score, member.to_owned()));
            true
        } else {
            false
        }
    }

    /// Returns the score for a member, or `None` if not present.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).map(|s| s.0)
    }

    /// Returns `true` if the member is present.
    pub fn contains(&self, member: &str) -> bool {
        self.scores.contains_key(member)
    }

    /// Adds `delta` to the member's score, inserting it at `delta` if
    /// absent. Returns the new score.
    pub fn incr(&mut self, member: &str, delta: f64) -> f64 {
        let new_score = self.score(member).unwrap_or(0.0) + delta;
        if let Some(old) = self.scores.remove(member) {
            self.tree.remove(&(old, member.to_owned()));
        }
        self.scores
            .insert(member.to_owned(), OrderedFloat(new_score));
        self.tree.insert((OrderedFloat(new_score), member.to_owned()), ());
        new_score
    }

    /// Returns the 0-based rank of a member (lowest score = rank 0).
    ///
    /// Walks the ordered index up to the target entry — O(n), which is
    /// acceptable for realistic set sizes.
    pub fn rank(&self, member: &str) -> Option<usize> {
        let score = self.scores.get(member)?;
        let key = (*score, member.to_owned());
        Some(self.tree.range(..&key).count())
    }

    /// Returns the 0-based rank counting from the highest score.
    pub fn rev_rank(&self, member: &str) -> Option<usize> {
        self.rank(member).map(|r| self.len() - 1 - r)
    }

    /// Returns members in the given rank range, inclusive on both ends.
    /// Supports negative indices: -1 = last, -2 = second to last.
    /// With `rev`, ranks count from the highest score downwards.
    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<(String, f64)> {
        let len = self.tree.len() as i64;
        let (s, e) = super::normalize_range(start, stop, len);
        if s > e {
            return Vec::new();
        }

        let (s, e) = (s as usize, e as usize);
        let take = e - s + 1;

        if rev {
            self.tree
                .keys()
                .rev()
                .skip(s)
                .take(take)
                .map(|(score, member)| (member.clone(), score.0))
                .collect()
        } else {
            self.tree
                .keys()
                .skip(s)
                .take(take)
                .map(|(score, member)| (member.clone(), score.0))
                .collect()
        }
    }

    /// Returns members whose scores fall within `[min, max]` under the
    /// given bound semantics, in ascending order, after skipping
    /// `offset` matches and yielding at most `count` (negative count =
    /// unlimited).
    pub fn range_by_score(
        &self,
        min: ScoreBound,
        max: ScoreBound,
        rev: bool,
        offset: usize,
        count: i64,
    ) -> Vec<(String, f64)> {
        let take = if count < 0 { usize::MAX } else { count as usize };

        if rev {
            // descending: walk from the top, stop once below the minimum
            self.tree
                .keys()
                .rev()
                .skip_while(|(score, _)| !max.allows_as_max(score.0))
                .take_while(|(score, _)| min.allows_as_min(score.0))
                .skip(offset)
                .take(take)
                .map(|(score, member)| (member.clone(), score.0))
                .collect()
        } else {
            // ascending: seek to the minimum score, stop past the maximum
            let start = (OrderedFloat(min.start_score()), String::new());
            self.tree
                .range(start..)
                .map(|(k, _)| k)
                .skip_while(|(score, _)| !min.allows_as_min(score.0))
                .take_while(|(score, _)| max.allows_as_max(score.0))
                .skip(offset)
                .take(take)
                .map(|(score, member)| (member.clone(), score.0))
                .collect()
        }
    }

    /// Counts members whose scores fall within the bounds.
    pub fn count_in_range(&self, min: ScoreBound, max: ScoreBound) -> usize {
        let start = (OrderedFloat(min.start_score()), String::new());
        self.tree
            .range(start..)
            .map(|(k, _)| k)
            .skip_while(|(score, _)| !min.allows_as_min(score.0))
            .take_while(|(score, _)| max.allows_as_max(score.0))
            .count()
    }

    /// Removes and returns up to `count` members from the low end
    /// (`max = false`) or high end (`max = true`).
    pub fn pop(&mut self, max: bool, count: usize) -> Vec<(String, f64)> {
        let mut out = Vec::with_capacity(count.min(self.len()));
        for _ in 0..count {
            let key = if max {
                self.tree.keys().next_back().cloned()
            } else {
                self.tree.keys().next().cloned()
            };
            let Some((score, member)) = key else { break };
            self.tree.remove(&(score, member.clone()));
            self.scores.remove(&member);
            out.push((member, score.0));
        }
        out
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` if the sorted set has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Returns an iterator over (member, score) pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.tree
            .keys()
            .map(|(score, member)| (member.as_str(), score.0))
    }
}
