//! Write-side persistence of edited blessings.
//!
//! # Responsibility
//! - Turn an edit into a complete, validated record.
//! - Push it to the store of record, then mirror it into the local cache.
//!
//! # Invariants
//! - A password is synthesized at most once per write, before any store call.
//! - The cache is touched only after the remote store acknowledged.
//! - A failed remote write leaves the cache unchanged and reaches the caller.

use crate::config::StoreBackend;
use crate::model::blessing::{normalize_text, BlessingRecord};
use crate::model::identifier::BlessingId;
use crate::service::error::BlessingError;
use crate::service::password::synthesize_password;
use crate::service::resolver::ResolveSource;
use crate::store::cache_store::{with_cache, CacheStore};
use crate::store::remote_store::RemoteStore;
use crate::store::upsert_record;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// One edit to persist, as typed by the author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Raw tag code; validated by the writer.
    pub id: String,
    /// Blessing text; trimmed before storage.
    pub text: String,
    pub password_enabled: bool,
    /// Optional explicit code; synthesized when protection is on and this is
    /// `None` or blank.
    pub password: Option<String>,
}

/// Acknowledged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub id: BlessingId,
    /// Record exactly as stored, including any synthesized password.
    pub record: BlessingRecord,
    /// Store of record that acknowledged the write.
    pub stored_in: ResolveSource,
}

/// Persists edits through the configured stores.
pub struct Writer<R, C> {
    remote: Arc<R>,
    cache: Arc<C>,
    backend: StoreBackend,
}

impl<R: RemoteStore, C: CacheStore> Writer<R, C> {
    pub fn new(remote: Arc<R>, cache: Arc<C>, backend: StoreBackend) -> Self {
        Self {
            remote,
            cache,
            backend,
        }
    }

    /// Validates and persists one whole record.
    ///
    /// # Errors
    /// - `InvalidIdentifier` / `Validation` before any store is called.
    /// - `RemoteWriteFailed` when the upsert fails or is rejected.
    /// - `CacheUnavailable` when the cache is the store of record and cannot
    ///   be written.
    pub async fn write(&self, request: WriteRequest) -> Result<WriteAck, BlessingError> {
        let (id, record) = prepare_record(request)?;
        let started_at = Instant::now();

        if self.backend.uses_remote() {
            if let Err(err) = self.remote.upsert(&record).await {
                error!(
                    "event=blessing_write module=writer status=error stage=remote duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(BlessingError::RemoteWriteFailed(err.to_string()));
            }
        }

        if self.backend.uses_cache() {
            let stored = record.clone();
            let result = with_cache(&self.cache, "cache_write", move |cache| {
                cache.modify(&mut |cached| upsert_record(cached, stored.clone()))
            })
            .await;
            match result {
                Ok(_) => {}
                Err(err) if self.backend.uses_remote() => {
                    warn!(
                        "event=blessing_write module=writer status=degraded stage=cache error={}",
                        err
                    );
                }
                Err(err) => {
                    error!(
                        "event=blessing_write module=writer status=error stage=cache error={}",
                        err
                    );
                    return Err(BlessingError::CacheUnavailable(err.to_string()));
                }
            }
        }

        let stored_in = if self.backend.uses_remote() {
            ResolveSource::Remote
        } else {
            ResolveSource::Cache
        };
        info!(
            "event=blessing_write module=writer status=ok stored_in={} password_enabled={} duration_ms={}",
            stored_in.as_str(),
            record.password_enabled,
            started_at.elapsed().as_millis()
        );
        Ok(WriteAck {
            id,
            record,
            stored_in,
        })
    }
}

/// Builds the record a write will persist.
///
/// # Errors
/// - `InvalidIdentifier` for a malformed id.
/// - `Validation` for empty or oversized text and bad passwords.
pub fn prepare_record(request: WriteRequest) -> Result<(BlessingId, BlessingRecord), BlessingError> {
    let id = BlessingId::parse(&request.id)
        .map_err(|err| BlessingError::InvalidIdentifier(err.0))?;

    let password = if request.password_enabled {
        let supplied = request
            .password
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Some(supplied.unwrap_or_else(synthesize_password))
    } else {
        None
    };

    let record = BlessingRecord {
        id: id.as_str().to_string(),
        text: normalize_text(request.text.trim()),
        password_enabled: request.password_enabled,
        password,
    };
    record.validate()?;
    Ok((id, record))
}
