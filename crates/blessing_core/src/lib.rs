//! Core blessing record resolution and synchronization.
//! This crate is the single source of truth for record invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{BlessingConfig, ConfigError, StoreBackend};
pub use logging::{
    default_log_level, init_logging, init_logging_from_env, logging_status, LoggingError,
};
pub use model::blessing::{
    parse_flag, BlessingRecord, BlessingValidationError, MAX_BLESSING_CHARS, NULL_TEXT_SENTINEL,
};
pub use model::identifier::{is_well_formed, BlessingId, MalformedIdentifier};
pub use service::blessing_service::BlessingService;
pub use service::error::BlessingError;
pub use service::password::synthesize_password;
pub use service::resolver::{Resolution, ResolveOutcome, ResolveSource, Resolver};
pub use service::session::{BlessingDraft, BlessingSession};
pub use service::writer::{WriteAck, WriteRequest, Writer};
pub use store::cache_store::{CacheSnapshot, CacheStore, SqliteCacheStore};
pub use store::document_store::{DocumentError, JsonDocumentStore};
pub use store::remote_store::{HttpRemoteStore, RemoteStore};
pub use store::static_dataset::StaticDataset;
pub use store::wire::{UpsertAck, UpsertResponse, MISSING_ID_MESSAGE};
pub use store::{StoreError, StoreResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
