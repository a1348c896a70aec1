//! Active expiration via random sampling.
//!
//! Instead of maintaining a time wheel or sorted expiry index, the
//! reaper periodically samples random keys that carry a TTL and evicts
//! any that have expired — the same algorithm Redis uses. Lazy removal
//! on access handles keys the sampler never touches.

use crate::store::Store;

/// Maximum keys with expiry to sample per round, per database.
const SAMPLE_SIZE: usize = 20;

/// If more than this fraction of the sample was expired, go again.
const EXPIRED_THRESHOLD: f64 = 0.25;

/// Maximum rounds per tick to bound time under the keyspace lock.
const MAX_ROUNDS: usize = 4;

/// Runs one active expiration cycle over every database.
///
/// Per database: sample up to [`SAMPLE_SIZE`] keys that have an
/// expiration set, remove the expired ones, and repeat while more than
/// 25% of the sample was expired (up to [`MAX_ROUNDS`] rounds).
/// Returns the total number of keys removed.
pub fn run_expiration_cycle(store: &mut Store) -> usize {
    let mut total_removed = 0;

    for index in 0..store.db_count() {
        let db = store.db(index);
        for _ in 0..MAX_ROUNDS {
            let (sampled, removed) = db.expire_sample(SAMPLE_SIZE);
            total_removed += removed;

            // a mostly-clean sample means this database can rest until
            // the next tick
            if sampled == 0 || (removed as f64) < (sampled as f64) * EXPIRED_THRESHOLD {
                break;
            }
        }
    }

    total_removed
}
