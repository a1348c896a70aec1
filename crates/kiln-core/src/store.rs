//! The store: a numbered collection of databases.
//!
//! One [`Store`] per server process, guarded by the server's keyspace
//! mutex. Tracks the dirty counter that drives the background snapshot
//! policy.

use crate::db::Db;

/// All databases of one server process.
#[derive(Debug, Clone)]
pub struct Store {
    dbs: Vec<Db>,
    /// Writes applied since the last completed snapshot.
    dirty: u64,
}

impl Store {
    /// Creates a store with `count` empty databases.
    pub fn new(count: usize) -> Self {
        Self {
            dbs: (0..count.max(1)).map(|_| Db::new()).collect(),
            dirty: 0,
        }
    }

    /// Number of databases.
    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    /// Mutable access to one database. Callers validate the index via
    /// SELECT before storing it on the session.
    pub fn db(&mut self, index: usize) -> &mut Db {
        &mut self.dbs[index]
    }

    /// Immutable access to one database.
    pub fn db_ref(&self, index: usize) -> &Db {
        &self.dbs[index]
    }

    /// Iterates databases with their indices.
    pub fn iter_dbs(&self) -> impl Iterator<Item = (usize, &Db)> {
        self.dbs.iter().enumerate()
    }

    /// Clears every database (FLUSHALL).
    pub fn flush_all(&mut self) {
        for db in &mut self.dbs {
            db.clear();
        }
        self.dirty += 1;
    }

    /// Total number of live keys across all databases.
    pub fn total_keys(&self) -> usize {
        self.dbs.iter().map(|db| db.len()).sum()
    }

    /// Records `count` completed write commands.
    pub fn mark_dirty(&mut self, count: u64) {
        self.dirty += count;
    }

    /// Writes applied since the last snapshot.
    pub fn dirty(&self) -> u64 {
        self.dirty
    }

    /// Resets the dirty counter after a completed snapshot.
    pub fn reset_dirty(&mut self) {
        self.dirty = 0;
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(16)
    }
}
