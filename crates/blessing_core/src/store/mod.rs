//! Store adapters for the three record sources.
//!
//! # Responsibility
//! - Define the contracts of the local cache and the remote record store.
//! - Keep SQLite, file and HTTP details out of the resolver and writer.
//!
//! # Invariants
//! - Ids are unique inside every snapshot a store hands out.
//! - Whole-snapshot replacement is the only write shape; there is no
//!   partial-field patch.

use crate::db::DbError;
use crate::model::blessing::BlessingRecord;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cache_store;
pub mod document_store;
pub mod remote_store;
pub mod static_dataset;
pub mod wire;

pub type StoreResult<T> = Result<T, StoreError>;

/// Transport and persistence failures raised by store adapters.
#[derive(Debug)]
pub enum StoreError {
    /// Network failure, timeout or non-success HTTP status.
    Transport(String),
    /// Response body was not the expected JSON shape.
    MalformedResponse(String),
    /// The store answered but refused the request in-band.
    Rejected(String),
    Db(DbError),
    Io(std::io::Error),
    Encode(serde_json::Error),
    LockPoisoned(&'static str),
    /// Blocking-pool task panicked or was cancelled.
    TaskFailed(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "remote store unreachable: {message}"),
            Self::MalformedResponse(message) => {
                write!(f, "malformed remote store response: {message}")
            }
            Self::Rejected(message) => write!(f, "remote store rejected request: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode records: {err}"),
            Self::LockPoisoned(what) => write!(f, "{what} lock poisoned"),
            Self::TaskFailed(message) => f.write_str(message),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Runs blocking store work (HTTP, SQLite) on the blocking pool.
pub(crate) async fn run_blocking<T, F>(operation: &'static str, work: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| StoreError::TaskFailed(format!("{operation} task failed: {err}")))?
}

/// Replaces the first record with the same id in place, or appends it.
/// Later records with that id are dropped.
pub fn upsert_record(records: &mut Vec<BlessingRecord>, record: BlessingRecord) {
    let id = record.id.clone();
    let mut pending = Some(record);
    records.retain_mut(|existing| {
        if existing.id != id {
            return true;
        }
        match pending.take() {
            Some(replacement) => {
                *existing = replacement;
                true
            }
            None => false,
        }
    });
    if let Some(record) = pending {
        records.push(record);
    }
}

/// Keeps the first occurrence of each id, in order. Matches the entry an
/// upsert replaces.
pub fn dedupe_by_id(records: Vec<BlessingRecord>) -> Vec<BlessingRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect()
}
