//! Set operations on the keyspace.

use std::collections::HashSet;

use rand::prelude::{IndexedRandom, IteratorRandom};

use crate::glob::glob_match;
use crate::types::Value;

use super::{Db, WrongType};

impl Db {
    /// Adds members to a set, creating it if missing. Returns the
    /// number of members that were newly added.
    pub fn set_add(&mut self, key: &str, members: Vec<String>) -> Result<usize, WrongType> {
        match self.value_mut(key) {
            Some(Value::Set(set)) => {
                let mut added = 0;
                for m in members {
                    if set.insert(m) {
                        added += 1;
                    }
                }
                Ok(added)
            }
            Some(_) => Err(WrongType),
            None => {
                let set: HashSet<String> = members.into_iter().collect();
                let added = set.len();
                self.insert(key, Value::Set(set));
                Ok(added)
            }
        }
    }

    /// Removes members from a set. Returns the number removed; deletes
    /// the key when the set empties.
    pub fn set_rem(&mut self, key: &str, members: &[String]) -> Result<usize, WrongType> {
        let removed = match self.value_mut(key) {
            Some(Value::Set(set)) => members.iter().filter(|m| set.remove(m.as_str())).count(),
            Some(_) => return Err(WrongType),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Returns `true` if `member` belongs to the set.
    pub fn set_contains(&mut self, key: &str, member: &str) -> Result<bool, WrongType> {
        match self.value(key) {
            Some(Value::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(WrongType),
            None => Ok(false),
        }
    }

    /// Returns all members of the set.
    pub fn set_members(&mut self, key: &str) -> Result<Vec<String>, WrongType> {
        match self.value(key) {
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(WrongType),
            None => Ok(Vec::new()),
        }
    }

    /// Returns the cardinality of the set, 0 if missing.
    pub fn set_card(&mut self, key: &str) -> Result<usize, WrongType> {
        match self.value(key) {
            Some(Value::Set(set)) => Ok(set.len()),
            Some(_) => Err(WrongType),
            None => Ok(0),
        }
    }

    /// Removes and returns up to `count` random members. Deletes the
    /// key when the set empties.
    pub fn set_pop(&mut self, key: &str, count: usize) -> Result<Vec<String>, WrongType> {
        let popped = match self.value_mut(key) {
            Some(Value::Set(set)) => {
                let mut rng = rand::rng();
                let victims: Vec<String> = set
                    .iter()
                    .cloned()
                    .choose_multiple(&mut rng, count.min(set.len()));
                for v in &victims {
                    set.remove(v);
                }
                victims
            }
            Some(_) => return Err(WrongType),
            None => Vec::new(),
        };
        self.drop_if_empty(key);
        Ok(popped)
    }

    /// Returns random members without removing them (SRANDMEMBER).
    /// `count = None` yields one member; a negative count allows
    /// repeats.
    pub fn set_rand_members(
        &mut self,
        key: &str,
        count: Option<i64>,
    ) -> Result<Vec<String>, WrongType> {
        let set = match self.value(key) {
            Some(Value::Set(set)) => set,
            Some(_) => return Err(WrongType),
            None => return Ok(Vec::new()),
        };
        let mut rng = rand::rng();

        match count {
            None => Ok(set.iter().choose(&mut rng).cloned().into_iter().collect()),
            Some(n) if n >= 0 => Ok(set
                .iter()
                .cloned()
                .choose_multiple(&mut rng, n as usize)),
            Some(n) => {
                // negative count: n.abs() draws with repetition
                let pool: Vec<&String> = set.iter().collect();
                Ok((0..n.unsigned_abs())
                    .filter_map(|_| pool.choose(&mut rng).map(|m| (*m).clone()))
                    .collect())
            }
        }
    }

    /// Moves `member` from `src` to `dst` atomically. Returns `true`
    /// when the member existed in `src`.
    pub fn set_move(&mut self, src: &str, dst: &str, member: &str) -> Result<bool, WrongType> {
        // both keys must be sets (or absent) before any mutation
        match self.value(src) {
            Some(Value::Set(_)) | None => {}
            Some(_) => return Err(WrongType),
        }
        match self.value(dst) {
            Some(Value::Set(_)) | None => {}
            Some(_) => return Err(WrongType),
        }

        let removed = self.set_rem(src, std::slice::from_ref(&member.to_owned()))?;
        if removed == 0 {
            return Ok(false);
        }
        self.set_add(dst, vec![member.to_owned()])?;
        Ok(true)
    }

    /// Computes the union of the named sets.
    pub fn set_union(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let mut out: HashSet<String> = HashSet::new();
        for key in keys {
            for m in self.set_members(key)? {
                out.insert(m);
            }
        }
        Ok(out.into_iter().collect())
    }

    /// Computes the intersection of the named sets.
    pub fn set_inter(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut out = self.set_members(first)?;
        for key in rest {
            if out.is_empty() {
                break;
            }
            let other: HashSet<String> = self.set_members(key)?.into_iter().collect();
            out.retain(|m| other.contains(m));
        }
        Ok(out)
    }

    /// Computes the difference: members of the first set not present in
    /// any of the rest.
    pub fn set_diff(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut out = self.set_members(first)?;
        for key in rest {
            if out.is_empty() {
                break;
            }
            let other: HashSet<String> = self.set_members(key)?.into_iter().collect();
            out.retain(|m| !other.contains(m));
        }
        Ok(out)
    }

    /// Replaces `dst` with the given members (the STORE variants).
    /// Deletes `dst` when the result is empty. Returns the cardinality.
    pub fn set_store(&mut self, dst: &str, members: Vec<String>) -> usize {
        let len = members.len();
        self.del(dst);
        if !members.is_empty() {
            self.insert(dst, Value::Set(members.into_iter().collect()));
        }
        len
    }

    /// Incrementally iterates set members (SSCAN).
    pub fn set_scan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(u64, Vec<String>), WrongType> {
        let set = match self.value(key) {
            Some(Value::Set(set)) => set,
            Some(_) => return Err(WrongType),
            None => return Ok((0, Vec::new())),
        };

        let target = if count == 0 { 10 } else { count };
        let mut out = Vec::new();
        let mut position = 0u64;

        for member in set.iter() {
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
            out.push(member.clone());
            if out.len() >= target {
                return Ok((position, out));
            }
        }
        Ok((0, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(db: &mut Db, key: &str, members: &[&str]) {
        db.set_add(key, members.iter().map(|s| s.to_string()).collect())
            .unwrap();
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn add_counts_new_members_only() {
        let mut db = Db::new();
        assert_eq!(
            db.set_add("s", vec!["a".into(), "b".into()]).unwrap(),
            2
        );
        assert_eq!(
            db.set_add("s", vec!["b".into(), "c".into()]).unwrap(),
            1
        );
        assert_eq!(db.set_card("s").unwrap(), 3);
    }

    #[test]
    fn rem_and_auto_delete() {
        let mut db = Db::new();
        add(&mut db, "s", &["a", "b"]);
        assert_eq!(db.set_rem("s", &["a".into(), "zz".into()]).unwrap(), 1);
        assert_eq!(db.set_rem("s", &["b".into()]).unwrap(), 1);
        assert!(!db.exists("s"));
    }

    #[test]
    fn membership() {
        let mut db = Db::new();
        add(&mut db, "s", &["a"]);
        assert!(db.set_contains("s", "a").unwrap());
        assert!(!db.set_contains("s", "b").unwrap());
        assert!(!db.set_contains("missing", "a").unwrap());
    }

    #[test]
    fn pop_removes_and_deletes_empty() {
        let mut db = Db::new();
        add(&mut db, "s", &["a", "b", "c"]);
        let popped = db.set_pop("s", 2).unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(db.set_card("s").unwrap(), 1);
        db.set_pop("s", 5).unwrap();
        assert!(!db.exists("s"));
    }

    #[test]
    fn rand_member_variants() {
        let mut db = Db::new();
        add(&mut db, "s", &["a", "b", "c"]);

        assert_eq!(db.set_rand_members("s", None).unwrap().len(), 1);
        assert_eq!(db.set_rand_members("s", Some(2)).unwrap().len(), 2);
        // positive count is capped at the cardinality
        assert_eq!(db.set_rand_members("s", Some(10)).unwrap().len(), 3);
        // negative count repeats
        assert_eq!(db.set_rand_members("s", Some(-7)).unwrap().len(), 7);
        // set is untouched
        assert_eq!(db.set_card("s").unwrap(), 3);
    }

    #[test]
    fn smove_semantics() {
        let mut db = Db::new();
        add(&mut db, "src", &["a", "b"]);
        assert!(db.set_move("src", "dst", "a").unwrap());
        assert!(!db.set_contains("src", "a").unwrap());
        assert!(db.set_contains("dst", "a").unwrap());
        // absent member
        assert!(!db.set_move("src", "dst", "zz").unwrap());
    }

    #[test]
    fn union_inter_diff() {
        let mut db = Db::new();
        add(&mut db, "s1", &["a", "b", "c"]);
        add(&mut db, "s2", &["b", "c", "d"]);

        assert_eq!(
            sorted(db.set_union(&["s1".into(), "s2".into()]).unwrap()),
            vec!["a", "b", "c", "d"]
        );
        assert_eq!(
            sorted(db.set_inter(&["s1".into(), "s2".into()]).unwrap()),
            vec!["b", "c"]
        );
        assert_eq!(
            sorted(db.set_diff(&["s1".into(), "s2".into()]).unwrap()),
            vec!["a"]
        );
    }

    #[test]
    fn operations_with_missing_keys() {
        let mut db = Db::new();
        add(&mut db, "s1", &["a"]);
        assert_eq!(
            sorted(db.set_union(&["s1".into(), "ghost".into()]).unwrap()),
            vec!["a"]
        );
        assert!(db
            .set_inter(&["s1".into(), "ghost".into()])
            .unwrap()
            .is_empty());
        assert_eq!(
            sorted(db.set_diff(&["s1".into(), "ghost".into()]).unwrap()),
            vec!["a"]
        );
    }

    #[test]
    fn store_replaces_and_deletes_empty() {
        let mut db = Db::new();
        add(&mut db, "dst", &["old"]);
        assert_eq!(db.set_store("dst", vec!["x".into(), "y".into()]), 2);
        assert_eq!(
            sorted(db.set_members("dst").unwrap()),
            vec!["x", "y"]
        );

        assert_eq!(db.set_store("dst", vec![]), 0);
        assert!(!db.exists("dst"));
    }

    #[test]
    fn scan_covers_all_members() {
        let mut db = Db::new();
        let members: Vec<String> = (0..30).map(|i| format!("m{i}")).collect();
        db.set_add("s", members.clone()).unwrap();

        let mut seen = HashSet::new();
        let mut cursor = 0;
        loop {
            let (next, batch) = db.set_scan("s", cursor, 7, None).unwrap();
            seen.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 30);
    }

    #[test]
    fn wrong_type() {
        let mut db = Db::new();
        db.set_string(
            "s",
            bytes::Bytes::from_static(b"v"),
            super::super::SetExpiry::Discard,
            false,
            false,
        );
        assert!(db.set_add("s", vec!["a".into()]).is_err());
        assert!(db.set_members("s").is_err());
        assert!(db.set_union(&["s".into()]).is_err());
    }
}
