//! Facade composing the resolver and writer over shared stores.
//!
//! # Responsibility
//! - Wire one backend selection into both read and write paths.
//! - Open sessions for the presentation layer.

use crate::config::{BlessingConfig, StoreBackend};
use crate::service::error::BlessingError;
use crate::service::resolver::{Resolution, Resolver};
use crate::service::session::{BlessingDraft, BlessingSession};
use crate::service::writer::{WriteAck, WriteRequest, Writer};
use crate::store::cache_store::{CacheStore, SqliteCacheStore};
use crate::store::remote_store::{HttpRemoteStore, RemoteStore};
use crate::store::static_dataset::StaticDataset;
use crate::store::StoreResult;
use log::info;
use std::sync::Arc;

/// Resolve/write entry point for one device.
pub struct BlessingService<R, C> {
    resolver: Resolver<R, C>,
    writer: Writer<R, C>,
    backend: StoreBackend,
}

impl<R: RemoteStore, C: CacheStore> BlessingService<R, C> {
    pub fn new(
        remote: Arc<R>,
        cache: Arc<C>,
        dataset: Arc<StaticDataset>,
        backend: StoreBackend,
    ) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&remote), Arc::clone(&cache), dataset, backend),
            writer: Writer::new(remote, cache, backend),
            backend,
        }
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    pub fn resolver(&self) -> &Resolver<R, C> {
        &self.resolver
    }

    pub fn writer(&self) -> &Writer<R, C> {
        &self.writer
    }

    pub async fn resolve(&self, raw_id: &str) -> Result<Resolution, BlessingError> {
        self.resolver.resolve(raw_id).await
    }

    pub async fn write(&self, request: WriteRequest) -> Result<WriteAck, BlessingError> {
        self.writer.write(request).await
    }

    /// Resolves `raw_id` and starts a fresh session for it.
    pub async fn open_session(&self, raw_id: &str) -> Result<BlessingSession, BlessingError> {
        let resolution = self.resolver.resolve(raw_id).await?;
        Ok(BlessingSession::new(resolution))
    }

    /// Saves `draft` through this service's writer into `session`.
    pub async fn save(
        &self,
        session: &mut BlessingSession,
        draft: &BlessingDraft,
    ) -> Result<(), BlessingError> {
        session.save(&self.writer, draft).await.map(|_| ())
    }
}

impl BlessingService<HttpRemoteStore, SqliteCacheStore> {
    /// Builds the production composition: HTTP remote store plus SQLite cache
    /// seeded from the bundled dataset.
    ///
    /// # Errors
    /// - Returns a store error when the cache database cannot be opened.
    pub fn from_config(config: &BlessingConfig) -> StoreResult<Self> {
        let dataset = StaticDataset::bundled().clone();
        let cache = if config.backend.uses_cache() {
            SqliteCacheStore::open(&config.cache_db_path, dataset.clone())?
        } else {
            SqliteCacheStore::open_in_memory(dataset.clone())?
        };
        let remote = HttpRemoteStore::new(config.remote_endpoint.clone(), config.request_timeout());
        info!(
            "event=service_init module=service status=ok backend={} timeout_ms={}",
            config.backend, config.request_timeout_ms
        );
        Ok(Self::new(
            Arc::new(remote),
            Arc::new(cache),
            Arc::new(dataset),
            config.backend,
        ))
    }
}
