//! Local cache store contract and SQLite implementation.
//!
//! # Responsibility
//! - Hold the device's full snapshot of blessing records as one named blob.
//! - Seed from the static dataset on first use.
//!
//! # Invariants
//! - Reads and writes are whole-array; no partial write is observable.
//! - An unparseable blob is replaced by the static dataset, never surfaced
//!   as an error.
//! - `modify` runs its read-modify-write inside one SQLite transaction while
//!   holding the connection lock.
//! - Async callers reach the cache through `with_cache`, never on a runtime
//!   worker thread.

use crate::db::{open_db, open_db_in_memory};
use crate::model::blessing::BlessingRecord;
use crate::store::static_dataset::StaticDataset;
use crate::store::{dedupe_by_id, run_blocking, StoreError, StoreResult};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Key of the blob holding the record array.
pub const CACHE_BLOB_KEY: &str = "blessing_records";

/// Records read from the cache plus recovery metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub records: Vec<BlessingRecord>,
    /// Set when the persisted blob was unparseable and got reset to the
    /// static dataset during this read.
    pub recovered_from_corruption: bool,
}

/// Per-device durable record cache.
pub trait CacheStore: Send + Sync + 'static {
    /// Loads the full snapshot, seeding or repairing it when needed.
    fn load_snapshot(&self) -> StoreResult<CacheSnapshot>;

    /// Replaces the full snapshot.
    fn save(&self, records: &[BlessingRecord]) -> StoreResult<()>;

    /// Applies `apply` to the current snapshot and persists the result as one
    /// logical operation.
    ///
    /// Returns `true` when the stored blob was unparseable and got reset to
    /// the static dataset before `apply` ran.
    fn modify(&self, apply: &mut dyn FnMut(&mut Vec<BlessingRecord>)) -> StoreResult<bool>;

    fn load(&self) -> StoreResult<Vec<BlessingRecord>> {
        Ok(self.load_snapshot()?.records)
    }
}

/// SQLite-backed cache keeping the snapshot in `kv_blobs`.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    seed: StaticDataset,
}

impl SqliteCacheStore {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection, seed: StaticDataset) -> Self {
        Self {
            conn: Mutex::new(conn),
            seed,
        }
    }

    pub fn open(path: impl AsRef<Path>, seed: StaticDataset) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?, seed))
    }

    pub fn open_in_memory(seed: StaticDataset) -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?, seed))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::LockPoisoned("cache connection"))
    }
}

impl CacheStore for SqliteCacheStore {
    fn load_snapshot(&self) -> StoreResult<CacheSnapshot> {
        let conn = self.lock()?;
        load_or_seed(&conn, &self.seed)
    }

    fn save(&self, records: &[BlessingRecord]) -> StoreResult<()> {
        let conn = self.lock()?;
        write_blob(&conn, &dedupe_by_id(records.to_vec()))
    }

    fn modify(&self, apply: &mut dyn FnMut(&mut Vec<BlessingRecord>)) -> StoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let CacheSnapshot {
            mut records,
            recovered_from_corruption,
        } = load_or_seed(&tx, &self.seed)?;
        apply(&mut records);
        write_blob(&tx, &dedupe_by_id(records))?;
        tx.commit()?;
        Ok(recovered_from_corruption)
    }
}

/// Runs `work` against the cache on the blocking pool.
///
/// SQLite calls may wait on file locks for the busy timeout; they must not
/// hold an async worker thread meanwhile.
pub async fn with_cache<C, T, F>(cache: &Arc<C>, operation: &'static str, work: F) -> StoreResult<T>
where
    C: CacheStore,
    T: Send + 'static,
    F: FnOnce(&C) -> StoreResult<T> + Send + 'static,
{
    let cache = Arc::clone(cache);
    run_blocking(operation, move || work(&cache)).await
}

fn load_or_seed(conn: &Connection, seed: &StaticDataset) -> StoreResult<CacheSnapshot> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_blobs WHERE key = ?1;",
            [CACHE_BLOB_KEY],
            |row| row.get(0),
        )
        .optional()?;

    let Some(raw) = raw else {
        debug!(
            "event=cache_seed module=cache status=ok records={}",
            seed.len()
        );
        write_blob(conn, seed.records())?;
        return Ok(CacheSnapshot {
            records: seed.records().to_vec(),
            recovered_from_corruption: false,
        });
    };

    match serde_json::from_str::<Vec<BlessingRecord>>(&raw) {
        Ok(records) => Ok(CacheSnapshot {
            records: dedupe_by_id(records),
            recovered_from_corruption: false,
        }),
        Err(err) => {
            warn!(
                "event=cache_corrupt module=cache status=degraded action=reset_to_static error={}",
                err
            );
            write_blob(conn, seed.records())?;
            Ok(CacheSnapshot {
                records: seed.records().to_vec(),
                recovered_from_corruption: true,
            })
        }
    }
}

fn write_blob(conn: &Connection, records: &[BlessingRecord]) -> StoreResult<()> {
    let json = serde_json::to_string(records).map_err(StoreError::Encode)?;
    conn.execute(
        "INSERT INTO kv_blobs (key, value, updated_at)
         VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at;",
        params![CACHE_BLOB_KEY, json],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{with_cache, CacheStore, SqliteCacheStore, CACHE_BLOB_KEY};
    use crate::model::blessing::BlessingRecord;
    use crate::model::identifier::BlessingId;
    use crate::store::static_dataset::StaticDataset;
    use crate::store::upsert_record;
    use std::sync::Arc;

    fn record(id: &str, text: &str) -> BlessingRecord {
        BlessingRecord::new(&BlessingId::parse(id).expect("valid id"), text)
    }

    fn seed() -> StaticDataset {
        StaticDataset::from_records(vec![record("A1B2C3D4", "seeded")])
    }

    #[test]
    fn first_load_seeds_from_static_dataset() {
        let cache = SqliteCacheStore::open_in_memory(seed()).expect("cache");
        let snapshot = cache.load_snapshot().expect("load");
        assert_eq!(snapshot.records, seed().records());
        assert!(!snapshot.recovered_from_corruption);
    }

    #[test]
    fn save_is_full_replace() {
        let cache = SqliteCacheStore::open_in_memory(seed()).expect("cache");
        cache
            .save(&[record("B1B2C3D4", "only")])
            .expect("save");
        let records = cache.load().expect("load");
        assert_eq!(records, vec![record("B1B2C3D4", "only")]);
    }

    #[test]
    fn modify_applies_read_modify_write() {
        let cache = SqliteCacheStore::open_in_memory(seed()).expect("cache");
        cache
            .modify(&mut |records| upsert_record(records, record("B1B2C3D4", "added")))
            .expect("modify");
        let records = cache.load().expect("load");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].blessing_text(), Some("added"));
    }

    #[test]
    fn corrupt_blob_resets_to_static_dataset() {
        let cache = SqliteCacheStore::open_in_memory(seed()).expect("cache");
        cache
            .lock()
            .expect("lock")
            .execute(
                "INSERT INTO kv_blobs (key, value) VALUES (?1, '{not json');",
                [CACHE_BLOB_KEY],
            )
            .expect("plant corrupt blob");

        let snapshot = cache.load_snapshot().expect("corruption is not fatal");
        assert!(snapshot.recovered_from_corruption);
        assert_eq!(snapshot.records, seed().records());

        let again = cache.load_snapshot().expect("load");
        assert!(!again.recovered_from_corruption);
    }

    #[test]
    fn modify_reports_reset_of_corrupt_blob() {
        let cache = SqliteCacheStore::open_in_memory(seed()).expect("cache");
        cache
            .lock()
            .expect("lock")
            .execute(
                "INSERT INTO kv_blobs (key, value) VALUES (?1, '[{\"nfc_id\":');",
                [CACHE_BLOB_KEY],
            )
            .expect("plant corrupt blob");

        let recovered = cache
            .modify(&mut |records| upsert_record(records, record("B1B2C3D4", "added")))
            .expect("modify");
        assert!(recovered);
        assert_eq!(cache.load().expect("load").len(), 2);

        let recovered = cache.modify(&mut |_| {}).expect("modify");
        assert!(!recovered);
    }

    #[tokio::test]
    async fn with_cache_runs_work_off_the_async_thread() {
        let cache = Arc::new(SqliteCacheStore::open_in_memory(seed()).expect("cache"));
        let caller = std::thread::current().id();
        let (records, worker) = with_cache(&cache, "test_load", |cache| {
            Ok((cache.load()?, std::thread::current().id()))
        })
        .await
        .expect("load");
        assert_eq!(records, seed().records());
        assert_ne!(worker, caller);
    }
}
