//! Store ⇄ snapshot glue.
//!
//! Converts between the engine's [`Value`] and the persistence layer's
//! [`SnapValue`], drives full-store saves, and restores the store at
//! boot. SAVE serializes under the keyspace lock; BGSAVE works from a
//! structural clone taken under the lock so serialization happens off
//! the critical path.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info};

use kiln_core::{SortedSet, Store, Value};
use kiln_persistence::{
    format, FormatError, Record, SnapEntry, SnapValue, SnapshotReader, SnapshotWriter,
};

/// Serializes the whole store to `path` (tmp file + atomic rename).
pub fn save(store: &Store, path: &Path) -> Result<(), FormatError> {
    let mut writer = SnapshotWriter::create(path)?;

    for (index, db) in store.iter_dbs() {
        if db.is_empty() {
            continue;
        }
        writer.select_db(index as u32)?;
        for (key, value, ttl_ms) in db.iter_entries() {
            writer.write_entry(&SnapEntry {
                key: key.to_owned(),
                value: value_to_snap(value),
                expire_ms: ttl_ms,
            })?;
        }
    }

    writer.finish()
}

/// Restores a store from `path`. A missing file yields an empty store;
/// a malformed one logs an error and also yields an empty store —
/// partial restores are never accepted.
pub fn load(path: &Path, databases: usize) -> Store {
    if !path.exists() {
        info!("no snapshot at {}, starting empty", path.display());
        return Store::new(databases);
    }

    match try_load(path, databases) {
        Ok((store, entries)) => {
            info!(entries, "restored snapshot from {}", path.display());
            store
        }
        Err(e) => {
            error!("snapshot restore failed ({e}), starting with an empty keyspace");
            Store::new(databases)
        }
    }
}

fn try_load(path: &Path, databases: usize) -> Result<(Store, u64), FormatError> {
    let mut reader = SnapshotReader::open(path)?;
    let mut store = Store::new(databases);
    let mut current_db = 0usize;
    let mut entries = 0u64;

    while let Some(record) = reader.next_record()? {
        match record {
            Record::SelectDb(index) => {
                let index = index as usize;
                if index >= store.db_count() {
                    return Err(FormatError::InvalidData(format!(
                        "snapshot references database {index} but only {} exist",
                        store.db_count()
                    )));
                }
                current_db = index;
            }
            Record::Entry(entry) => {
                let ttl = if entry.expire_ms >= 0 {
                    Some(Duration::from_millis(entry.expire_ms as u64))
                } else {
                    None
                };
                store
                    .db(current_db)
                    .restore(entry.key, snap_to_value(entry.value), ttl);
                entries += 1;
            }
        }
    }

    Ok((store, entries))
}

/// Engine value → persistence value.
pub fn value_to_snap(value: &Value) -> SnapValue {
    match value {
        Value::Str(b) => SnapValue::Str(b.clone()),
        Value::List(l) => SnapValue::List(l.clone()),
        Value::Set(s) => SnapValue::Set(s.iter().cloned().collect()),
        Value::Hash(h) => SnapValue::Hash(h.iter().map(|(f, v)| (f.clone(), v.clone())).collect()),
        Value::Zset(z) => SnapValue::Zset(z.iter().map(|(m, s)| (s, m.to_owned())).collect()),
    }
}

/// Persistence value → engine value.
pub fn snap_to_value(value: SnapValue) -> Value {
    match value {
        SnapValue::Str(b) => Value::Str(b),
        SnapValue::List(l) => Value::List(l),
        SnapValue::Set(s) => Value::Set(s.into_iter().collect()),
        SnapValue::Hash(h) => Value::Hash(h.into_iter().collect()),
        SnapValue::Zset(members) => {
            let mut zset = SortedSet::new();
            for (score, member) in members {
                zset.add(member, score);
            }
            Value::Zset(zset)
        }
    }
}

/// Serializes one value in the snapshot entry encoding (type byte +
/// payload, no key or expiry). Used by DUMP.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::new();
    match value_to_snap(value) {
        SnapValue::Str(data) => {
            format::write_u8(&mut buf, format::TYPE_STRING)?;
            format::write_bytes(&mut buf, &data)?;
        }
        SnapValue::List(items) => {
            format::write_u8(&mut buf, format::TYPE_LIST)?;
            format::write_len(&mut buf, items.len())?;
            for item in &items {
                format::write_bytes(&mut buf, item)?;
            }
        }
        SnapValue::Set(members) => {
            format::write_u8(&mut buf, format::TYPE_SET)?;
            format::write_len(&mut buf, members.len())?;
            for member in &members {
                format::write_bytes(&mut buf, member.as_bytes())?;
            }
        }
        SnapValue::Hash(fields) => {
            format::write_u8(&mut buf, format::TYPE_HASH)?;
            format::write_len(&mut buf, fields.len())?;
            for (field, value) in &fields {
                format::write_bytes(&mut buf, field.as_bytes())?;
                format::write_bytes(&mut buf, value)?;
            }
        }
        SnapValue::Zset(members) => {
            format::write_u8(&mut buf, format::TYPE_ZSET)?;
            format::write_len(&mut buf, members.len())?;
            for (score, member) in &members {
                format::write_f64(&mut buf, *score)?;
                format::write_bytes(&mut buf, member.as_bytes())?;
            }
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use kiln_core::db::SetExpiry;
    use kiln_core::ZAddFlags;

    fn temp_path(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        (dir, path)
    }

    fn populate(store: &mut Store) {
        let db = store.db(0);
        db.set_string("greeting", Bytes::from_static(b"hello"), SetExpiry::Discard, false, false);
        db.set_string(
            "ttl-key",
            Bytes::from_static(b"short"),
            SetExpiry::Ttl(Duration::from_secs(120)),
            false,
            false,
        );
        db.list_push(
            "mylist",
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
            false,
            false,
        )
        .unwrap();
        db.set_add("myset", vec!["x".into(), "y".into()]).unwrap();
        db.hash_set("myhash", vec![("f".into(), Bytes::from_static(b"v"))])
            .unwrap();
        db.zset_add(
            "myzset",
            ZAddFlags::default(),
            vec![(1.0, "one".into()), (2.0, "two".into())],
        )
        .unwrap();

        // a key in another database
        store
            .db(3)
            .set_string("other", Bytes::from_static(b"db3"), SetExpiry::Discard, false, false);
    }

    #[test]
    fn save_and_load_round_trip() {
        let (_dir, path) = temp_path("round.snap");

        let mut store = Store::new(16);
        populate(&mut store);
        save(&store, &path).unwrap();

        let mut restored = load(&path, 16);
        assert_eq!(
            restored.db(0).get_string("greeting").unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert_eq!(restored.db(0).list_len("mylist").unwrap(), 2);
        assert_eq!(restored.db(0).set_card("myset").unwrap(), 2);
        assert_eq!(restored.db(0).hash_len("myhash").unwrap(), 1);
        assert_eq!(restored.db(0).zset_card("myzset").unwrap(), 2);
        assert_eq!(restored.db(0).zset_score("myzset", "two").unwrap(), Some(2.0));
        assert_eq!(
            restored.db(3).get_string("other").unwrap(),
            Some(Bytes::from_static(b"db3"))
        );

        // TTL survives as a remaining duration
        match restored.db(0).ttl_secs("ttl-key") {
            kiln_core::TtlResult::Remaining(s) => assert!(s <= 120),
            other => panic!("expected Remaining, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, path) = temp_path("missing.snap");
        let store = load(&path, 4);
        assert_eq!(store.db_count(), 4);
        assert_eq!(store.total_keys(), 0);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let (_dir, path) = temp_path("corrupt.snap");

        let mut store = Store::new(16);
        populate(&mut store);
        save(&store, &path).unwrap();

        // flip a byte in the middle
        let mut data = std::fs::read(&path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0x40;
        std::fs::write(&path, &data).unwrap();

        let restored = load(&path, 16);
        assert_eq!(restored.total_keys(), 0, "partial restores are rejected");
    }

    #[test]
    fn db_index_out_of_range_rejected() {
        let (_dir, path) = temp_path("range.snap");

        let mut store = Store::new(16);
        populate(&mut store);
        save(&store, &path).unwrap();

        // loading with fewer databases than the snapshot references
        let restored = load(&path, 2);
        assert_eq!(restored.total_keys(), 0);
    }

    #[test]
    fn expired_entries_dropped_on_save() {
        let (_dir, path) = temp_path("expired.snap");

        let mut store = Store::new(1);
        store.db(0).set_string(
            "gone",
            Bytes::from_static(b"x"),
            SetExpiry::Ttl(Duration::from_millis(5)),
            false,
            false,
        );
        store
            .db(0)
            .set_string("kept", Bytes::from_static(b"y"), SetExpiry::Discard, false, false);
        std::thread::sleep(Duration::from_millis(20));

        save(&store, &path).unwrap();
        let restored = load(&path, 1);
        assert_eq!(restored.total_keys(), 1);
    }

    #[test]
    fn encode_value_is_tagged() {
        let encoded = encode_value(&Value::Str(Bytes::from_static(b"abc"))).unwrap();
        assert_eq!(encoded[0], format::TYPE_STRING);
        // [tag][u32 len][payload]
        assert_eq!(encoded.len(), 1 + 4 + 3);
    }
}
