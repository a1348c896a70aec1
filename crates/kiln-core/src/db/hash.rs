//! Hash operations on the keyspace.

use ahash::AHashMap;
use bytes::Bytes;
use rand::prelude::{IndexedRandom, IteratorRandom};

use crate::glob::glob_match;
use crate::types::{format_float, Value};

use super::{Db, FloatError, IntError, WrongType};

impl Db {
    /// Sets field/value pairs on a hash, creating it if missing.
    /// Returns the number of fields that were newly created.
    pub fn hash_set(
        &mut self,
        key: &str,
        pairs: Vec<(String, Bytes)>,
    ) -> Result<usize, WrongType> {
        match self.value_mut(key) {
            Some(Value::Hash(hash)) => {
                let mut created = 0;
                for (field, value) in pairs {
                    if hash.insert(field, value).is_none() {
                        created += 1;
                    }
                }
                Ok(created)
            }
            Some(_) => Err(WrongType),
            None => {
                let hash: AHashMap<String, Bytes> = pairs.into_iter().collect();
                let created = hash.len();
                self.insert(key, Value::Hash(hash));
                Ok(created)
            }
        }
    }

    /// Sets a field only if it does not exist (HSETNX). Returns `true`
    /// when the field was created.
    pub fn hash_set_nx(&mut self, key: &str, field: String, value: Bytes) -> Result<bool, WrongType> {
        match self.value_mut(key) {
            Some(Value::Hash(hash)) => {
                if hash.contains_key(&field) {
                    Ok(false)
                } else {
                    hash.insert(field, value);
                    Ok(true)
                }
            }
            Some(_) => Err(WrongType),
            None => {
                let mut hash = AHashMap::new();
                hash.insert(field, value);
                self.insert(key, Value::Hash(hash));
                Ok(true)
            }
        }
    }

    /// Returns the value of one field.
    pub fn hash_get(&mut self, key: &str, field: &str) -> Result<Option<Bytes>, WrongType> {
        match self.value(key) {
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(WrongType),
            None => Ok(None),
        }
    }

    /// Returns the values of several fields, `None` per missing field.
    pub fn hash_mget(
        &mut self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<Bytes>>, WrongType> {
        match self.value(key) {
            Some(Value::Hash(hash)) => {
                Ok(fields.iter().map(|f| hash.get(f.as_str()).cloned()).collect())
            }
            Some(_) => Err(WrongType),
            None => Ok(vec![None; fields.len()]),
        }
    }

    /// Deletes fields. Returns the number removed; deletes the key when
    /// the hash empties.
    pub fn hash_del(&mut self, key: &str, fields: &[String]) -> Result<usize, WrongType> {
        let removed = match self.value_mut(key) {
            Some(Value::Hash(hash)) => fields
                .iter()
                .filter(|f| hash.remove(f.as_str()).is_some())
                .count(),
            Some(_) => return Err(WrongType),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Returns `true` if the field exists.
    pub fn hash_exists(&mut self, key: &str, field: &str) -> Result<bool, WrongType> {
        match self.value(key) {
            Some(Value::Hash(hash)) => Ok(hash.contains_key(field)),
            Some(_) => Err(WrongType),
            None => Ok(false),
        }
    }

    /// Returns the number of fields, 0 if missing.
    pub fn hash_len(&mut self, key: &str) -> Result<usize, WrongType> {
        match self.value(key) {
            Some(Value::Hash(hash)) => Ok(hash.len()),
            Some(_) => Err(WrongType),
            None => Ok(0),
        }
    }

    /// Returns all field/value pairs.
    pub fn hash_get_all(&mut self, key: &str) -> Result<Vec<(String, Bytes)>, WrongType> {
        match self.value(key) {
            Some(Value::Hash(hash)) => {
                Ok(hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            }
            Some(_) => Err(WrongType),
            None => Ok(Vec::new()),
        }
    }

    /// Adds `delta` to the integer value of a field, creating it at 0.
    pub fn hash_incr_by(&mut self, key: &str, field: &str, delta: i64) -> Result<i64, IntError> {
        let current = match self.hash_get(key, field).map_err(|_| IntError::WrongType)? {
            Some(data) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(IntError::HashValueNotAnInteger)?,
            None => 0,
        };
        let new_val = current.checked_add(delta).ok_or(IntError::Overflow)?;
        self.hash_set(key, vec![(field.to_owned(), Bytes::from(new_val.to_string()))])
            .map_err(|_| IntError::WrongType)?;
        Ok(new_val)
    }

    /// Adds a float `delta` to the value of a field, creating it at 0.
    /// Returns the formatted new value.
    pub fn hash_incr_by_float(
        &mut self,
        key: &str,
        field: &str,
        delta: f64,
    ) -> Result<String, FloatError> {
        let current = match self.hash_get(key, field).map_err(|_| FloatError::WrongType)? {
            Some(data) => std::str::from_utf8(&data)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or(FloatError::HashValueNotAFloat)?,
            None => 0.0,
        };
        let new_val = current + delta;
        if new_val.is_nan() || new_val.is_infinite() {
            return Err(FloatError::NanOrInfinity);
        }
        let formatted = format_float(new_val);
        self.hash_set(
            key,
            vec![(field.to_owned(), Bytes::from(formatted.clone()))],
        )
        .map_err(|_| FloatError::WrongType)?;
        Ok(formatted)
    }

    /// Returns the byte length of a field's value, 0 if absent.
    pub fn hash_strlen(&mut self, key: &str, field: &str) -> Result<usize, WrongType> {
        Ok(self.hash_get(key, field)?.map_or(0, |v| v.len()))
    }

    /// Returns random fields (HRANDFIELD). `count = None` yields one
    /// field; a negative count allows repeats.
    pub fn hash_rand_fields(
        &mut self,
        key: &str,
        count: Option<i64>,
    ) -> Result<Vec<(String, Bytes)>, WrongType> {
        let hash = match self.value(key) {
            Some(Value::Hash(hash)) => hash,
            Some(_) => return Err(WrongType),
            None => return Ok(Vec::new()),
        };
        let mut rng = rand::rng();

        match count {
            None => Ok(hash
                .iter()
                .choose(&mut rng)
                .map(|(f, v)| (f.clone(), v.clone()))
                .into_iter()
                .collect()),
            Some(n) if n >= 0 => Ok(hash
                .iter()
                .map(|(f, v)| (f.clone(), v.clone()))
                .choose_multiple(&mut rng, n as usize)),
            Some(n) => {
                let pool: Vec<(&String, &Bytes)> = hash.iter().collect();
                Ok((0..n.unsigned_abs())
                    .filter_map(|_| pool.choose(&mut rng))
                    .map(|(f, v)| ((*f).clone(), (*v).clone()))
                    .collect())
            }
        }
    }

    /// Incrementally iterates hash fields (HSCAN).
    pub fn hash_scan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(u64, Vec<(String, Bytes)>), WrongType> {
        let hash = match self.value(key) {
            Some(Value::Hash(hash)) => hash,
            Some(_) => return Err(WrongType),
            None => return Ok((0, Vec::new())),
        };

        let target = if count == 0 { 10 } else { count };
        let mut out = Vec::new();
        let mut position = 0u64;

        for (field, value) in hash.iter() {
            if position < cursor {
                position += 1;
                continue;
            }
            position += 1;
            if let Some(pat) = pattern {
                if !glob_match(pat, field) {
                    continue;
                }
            }
            out.push((field.clone(), value.clone()));
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

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn hset(db: &mut Db, key: &str, pairs: &[(&str, &str)]) -> usize {
        db.hash_set(
            key,
            pairs
                .iter()
                .map(|(f, v)| (f.to_string(), b(v)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn set_counts_new_fields() {
        let mut db = Db::new();
        assert_eq!(hset(&mut db, "h", &[("name", "John"), ("age", "30")]), 2);
        // overwriting an existing field counts 0, new field counts 1
        assert_eq!(hset(&mut db, "h", &[("age", "31"), ("city", "Oslo")]), 1);
        assert_eq!(db.hash_get("h", "age").unwrap(), Some(b("31")));
    }

    #[test]
    fn setnx_only_creates() {
        let mut db = Db::new();
        assert!(db.hash_set_nx("h", "f".into(), b("1")).unwrap());
        assert!(!db.hash_set_nx("h", "f".into(), b("2")).unwrap());
        assert_eq!(db.hash_get("h", "f").unwrap(), Some(b("1")));
    }

    #[test]
    fn get_missing_field_and_key() {
        let mut db = Db::new();
        assert_eq!(db.hash_get("h", "f").unwrap(), None);
        hset(&mut db, "h", &[("a", "1")]);
        assert_eq!(db.hash_get("h", "zz").unwrap(), None);
    }

    #[test]
    fn mget_preserves_order() {
        let mut db = Db::new();
        hset(&mut db, "h", &[("a", "1"), ("b", "2")]);
        let got = db
            .hash_mget("h", &["b".into(), "zz".into(), "a".into()])
            .unwrap();
        assert_eq!(got, vec![Some(b("2")), None, Some(b("1"))]);
    }

    #[test]
    fn del_and_auto_delete() {
        let mut db = Db::new();
        hset(&mut db, "h", &[("a", "1"), ("b", "2")]);
        assert_eq!(db.hash_del("h", &["a".into(), "zz".into()]).unwrap(), 1);
        assert_eq!(db.hash_del("h", &["b".into()]).unwrap(), 1);
        assert!(!db.exists("h"));
    }

    #[test]
    fn exists_len() {
        let mut db = Db::new();
        hset(&mut db, "h", &[("a", "1")]);
        assert!(db.hash_exists("h", "a").unwrap());
        assert!(!db.hash_exists("h", "b").unwrap());
        assert_eq!(db.hash_len("h").unwrap(), 1);
        assert_eq!(db.hash_len("missing").unwrap(), 0);
    }

    #[test]
    fn get_all_pairs() {
        let mut db = Db::new();
        hset(&mut db, "h", &[("a", "1"), ("b", "2")]);
        let mut all = db.hash_get_all("h").unwrap();
        all.sort();
        assert_eq!(all, vec![("a".to_string(), b("1")), ("b".to_string(), b("2"))]);
    }

    #[test]
    fn incr_by_creates_and_adds() {
        let mut db = Db::new();
        assert_eq!(db.hash_incr_by("h", "n", 5).unwrap(), 5);
        assert_eq!(db.hash_incr_by("h", "n", -2).unwrap(), 3);
    }

    #[test]
    fn incr_by_rejects_non_integer() {
        let mut db = Db::new();
        hset(&mut db, "h", &[("n", "abc")]);
        assert_eq!(
            db.hash_incr_by("h", "n", 1),
            Err(IntError::HashValueNotAnInteger)
        );
    }

    #[test]
    fn incr_by_float_formats() {
        let mut db = Db::new();
        assert_eq!(db.hash_incr_by_float("h", "f", 10.5).unwrap(), "10.5");
        assert_eq!(db.hash_incr_by_float("h", "f", 0.5).unwrap(), "11");
    }

    #[test]
    fn strlen() {
        let mut db = Db::new();
        hset(&mut db, "h", &[("f", "hello")]);
        assert_eq!(db.hash_strlen("h", "f").unwrap(), 5);
        assert_eq!(db.hash_strlen("h", "zz").unwrap(), 0);
    }

    #[test]
    fn rand_fields() {
        let mut db = Db::new();
        hset(&mut db, "h", &[("a", "1"), ("b", "2"), ("c", "3")]);
        assert_eq!(db.hash_rand_fields("h", None).unwrap().len(), 1);
        assert_eq!(db.hash_rand_fields("h", Some(2)).unwrap().len(), 2);
        assert_eq!(db.hash_rand_fields("h", Some(10)).unwrap().len(), 3);
        assert_eq!(db.hash_rand_fields("h", Some(-6)).unwrap().len(), 6);
        assert!(db.hash_rand_fields("missing", Some(3)).unwrap().is_empty());
    }

    #[test]
    fn scan_covers_all_fields() {
        let mut db = Db::new();
        let pairs: Vec<(String, Bytes)> =
            (0..25).map(|i| (format!("f{i}"), b("v"))).collect();
        db.hash_set("h", pairs).unwrap();

        let mut seen = std::collections::HashSet::new();
        let mut cursor = 0;
        loop {
            let (next, batch) = db.hash_scan("h", cursor, 6, None).unwrap();
            seen.extend(batch.into_iter().map(|(f, _)| f));
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn wrong_type() {
        let mut db = Db::new();
        db.set_string("h", b("v"), super::super::SetExpiry::Discard, false, false);
        assert!(db.hash_set("h", vec![("f".into(), b("1"))]).is_err());
        assert!(db.hash_get("h", "f").is_err());
        assert!(db.hash_len("h").is_err());
    }
}
