//! Read-side resolution across remote, cache and static sources.
//!
//! # Responsibility
//! - Produce exactly one effective record per identifier.
//! - Keep the local cache in step with the latest known remote snapshot.
//!
//! # Invariants
//! - Precedence is Remote > Cache > Static; fields are never merged across
//!   sources.
//! - A found record without text resolves to "no blessing" and stops the
//!   search there.
//! - Remote and cache read failures degrade the result; they are never
//!   returned as errors.
//! - Malformed ids are rejected before any store is called.

use crate::config::StoreBackend;
use crate::model::blessing::BlessingRecord;
use crate::model::identifier::BlessingId;
use crate::service::error::BlessingError;
use crate::store::cache_store::{with_cache, CacheStore};
use crate::store::remote_store::RemoteStore;
use crate::store::static_dataset::StaticDataset;
use crate::store::{dedupe_by_id, upsert_record, StoreError};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Source that answered a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveSource {
    Remote,
    Cache,
    Static,
}

impl ResolveSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Cache => "cache",
            Self::Static => "static",
        }
    }
}

/// What a resolution found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Record with usable text.
    Blessing(BlessingRecord),
    /// Known identifier whose record carries no text.
    NoBlessing(BlessingRecord),
    /// Identifier absent from every consulted source.
    Unknown,
}

/// Result of resolving one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: BlessingId,
    pub outcome: ResolveOutcome,
    pub source: ResolveSource,
    /// Non-fatal failures met on the way, in the order they happened.
    pub degraded: Vec<BlessingError>,
}

impl Resolution {
    /// Builds the view of a record that was just written.
    pub fn from_written(id: BlessingId, record: BlessingRecord, source: ResolveSource) -> Self {
        Self {
            id,
            outcome: classify(record),
            source,
            degraded: Vec::new(),
        }
    }

    /// Returns the blessing; `None` covers both "no blessing" and unknown.
    pub fn record(&self) -> Option<&BlessingRecord> {
        match &self.outcome {
            ResolveOutcome::Blessing(record) => Some(record),
            ResolveOutcome::NoBlessing(_) | ResolveOutcome::Unknown => None,
        }
    }

    pub fn has_blessing(&self) -> bool {
        self.record().is_some()
    }

    pub fn is_known(&self) -> bool {
        !matches!(self.outcome, ResolveOutcome::Unknown)
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Turns an unknown identifier into `BlessingError::UnknownIdentifier`.
    pub fn ensure_known(self) -> Result<Self, BlessingError> {
        if self.is_known() {
            Ok(self)
        } else {
            Err(BlessingError::UnknownIdentifier(self.id))
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self.outcome {
            ResolveOutcome::Blessing(_) => "blessing",
            ResolveOutcome::NoBlessing(_) => "no_blessing",
            ResolveOutcome::Unknown => "unknown",
        }
    }
}

/// Resolves identifiers against the configured sources.
pub struct Resolver<R, C> {
    remote: Arc<R>,
    cache: Arc<C>,
    dataset: Arc<StaticDataset>,
    backend: StoreBackend,
}

impl<R: RemoteStore, C: CacheStore> Resolver<R, C> {
    pub fn new(
        remote: Arc<R>,
        cache: Arc<C>,
        dataset: Arc<StaticDataset>,
        backend: StoreBackend,
    ) -> Self {
        Self {
            remote,
            cache,
            dataset,
            backend,
        }
    }

    /// Resolves `raw_id` to its effective record.
    ///
    /// # Errors
    /// - `InvalidIdentifier` when `raw_id` is not a tag code. This is the only
    ///   error; every store failure degrades instead.
    pub async fn resolve(&self, raw_id: &str) -> Result<Resolution, BlessingError> {
        let id = BlessingId::parse(raw_id).map_err(|err| {
            debug!("event=resolve module=resolver status=rejected reason=malformed_id");
            BlessingError::InvalidIdentifier(err.0)
        })?;
        let started_at = Instant::now();
        let mut degraded = Vec::new();

        if self.backend.uses_remote() {
            match self.remote.fetch_all().await {
                Ok(records) => {
                    let records = dedupe_by_id(records);
                    let hit = records
                        .iter()
                        .find(|record| record.id == id.as_str())
                        .cloned();
                    if self.backend.uses_cache() {
                        self.merge_remote_snapshot(records, &mut degraded).await;
                    }
                    if let Some(record) = hit {
                        return Ok(self.finish(id, record, ResolveSource::Remote, degraded, started_at));
                    }
                }
                Err(err) => {
                    let reason = remote_read_degradation(err);
                    warn!(
                        "event=remote_fetch module=resolver status=degraded error_code={} error={}",
                        reason.code(),
                        reason
                    );
                    degraded.push(reason);
                }
            }
        }

        if self.backend.uses_cache() {
            match with_cache(&self.cache, "cache_load", |cache| cache.load_snapshot()).await {
                Ok(snapshot) => {
                    if snapshot.recovered_from_corruption {
                        degraded.push(BlessingError::CacheCorrupt);
                    }
                    if let Some(record) = snapshot
                        .records
                        .into_iter()
                        .find(|record| record.id == id.as_str())
                    {
                        return Ok(self.finish(id, record, ResolveSource::Cache, degraded, started_at));
                    }
                }
                Err(err) => {
                    warn!(
                        "event=cache_load module=resolver status=degraded error={}",
                        err
                    );
                    degraded.push(BlessingError::CacheUnavailable(err.to_string()));
                }
            }
        }

        match self.dataset.find(id.as_str()).cloned() {
            Some(record) => {
                if self.backend.uses_cache() {
                    self.warm_cache(&record, &mut degraded).await;
                }
                Ok(self.finish(id, record, ResolveSource::Static, degraded, started_at))
            }
            None => {
                let resolution = Resolution {
                    id,
                    outcome: ResolveOutcome::Unknown,
                    source: ResolveSource::Static,
                    degraded,
                };
                log_resolution(&resolution, started_at);
                Ok(resolution)
            }
        }
    }

    /// Replaces cached records that the remote snapshot also holds and keeps
    /// cache-only records after them.
    async fn merge_remote_snapshot(
        &self,
        remote: Vec<BlessingRecord>,
        degraded: &mut Vec<BlessingError>,
    ) {
        let result = with_cache(&self.cache, "cache_sync", move |cache| {
            cache.modify(&mut |cached| {
                let local_only: Vec<BlessingRecord> = cached
                    .drain(..)
                    .filter(|record| !remote.iter().any(|fetched| fetched.id == record.id))
                    .collect();
                cached.extend(remote.iter().cloned());
                cached.extend(local_only);
            })
        })
        .await;
        note_cache_write("cache_sync", result, degraded);
    }

    async fn warm_cache(&self, record: &BlessingRecord, degraded: &mut Vec<BlessingError>) {
        let record = record.clone();
        let result = with_cache(&self.cache, "cache_warm", move |cache| {
            cache.modify(&mut |cached| upsert_record(cached, record.clone()))
        })
        .await;
        note_cache_write("cache_warm", result, degraded);
    }

    fn finish(
        &self,
        id: BlessingId,
        record: BlessingRecord,
        source: ResolveSource,
        degraded: Vec<BlessingError>,
        started_at: Instant,
    ) -> Resolution {
        if record.requires_password() && !record.is_complete() {
            warn!(
                "event=resolve module=resolver status=degraded reason=password_missing source={}",
                source.as_str()
            );
        }
        let resolution = Resolution {
            id,
            outcome: classify(record),
            source,
            degraded,
        };
        log_resolution(&resolution, started_at);
        resolution
    }
}

fn classify(record: BlessingRecord) -> ResolveOutcome {
    if record.has_blessing() {
        ResolveOutcome::Blessing(record)
    } else {
        ResolveOutcome::NoBlessing(record)
    }
}

fn note_cache_write(
    event: &'static str,
    result: Result<bool, StoreError>,
    degraded: &mut Vec<BlessingError>,
) {
    match result {
        Ok(true) if !degraded.contains(&BlessingError::CacheCorrupt) => {
            degraded.push(BlessingError::CacheCorrupt);
        }
        Ok(_) => {}
        Err(err) => {
            warn!(
                "event={} module=resolver status=degraded error={}",
                event, err
            );
            degraded.push(BlessingError::CacheUnavailable(err.to_string()));
        }
    }
}

fn remote_read_degradation(err: StoreError) -> BlessingError {
    match err {
        StoreError::MalformedResponse(message) => BlessingError::MalformedRemoteResponse(message),
        other => BlessingError::RemoteUnavailable(other.to_string()),
    }
}

fn log_resolution(resolution: &Resolution, started_at: Instant) {
    info!(
        "event=resolve module=resolver status={} source={} outcome={} degraded={} duration_ms={}",
        if resolution.is_degraded() { "degraded" } else { "ok" },
        resolution.source.as_str(),
        resolution.outcome_label(),
        resolution.degraded.len(),
        started_at.elapsed().as_millis()
    );
}
