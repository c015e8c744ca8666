//! Runtime configuration for composing the blessing stores.
//!
//! # Responsibility
//! - Select the store backend (remote, cache, or both layered).
//! - Read endpoint, cache path and timeout from the environment.
//!
//! # Invariants
//! - Unknown backend names are rejected instead of silently defaulting.
//! - Out-of-range timeouts fall back to the default.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_REMOTE_URL: &str = "BLESSING_REMOTE_URL";
pub const ENV_CACHE_DB: &str = "BLESSING_CACHE_DB";
pub const ENV_BACKEND: &str = "BLESSING_BACKEND";
pub const ENV_HTTP_TIMEOUT_MS: &str = "BLESSING_HTTP_TIMEOUT_MS";

pub const DEFAULT_REMOTE_ENDPOINT: &str = "http://127.0.0.1:8080/";
pub const DEFAULT_CACHE_DB_FILE: &str = "blessing_cache.sqlite3";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const REQUEST_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=60_000;

/// Which sources the resolver and writer talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Remote > Cache > Static; writes go remote first, then cache.
    #[default]
    Layered,
    /// Remote > Static; the local cache is never touched.
    RemoteOnly,
    /// Cache > Static; the remote store is never called and the cache is
    /// the store of record.
    CacheOnly,
}

impl StoreBackend {
    pub fn uses_remote(self) -> bool {
        matches!(self, Self::Layered | Self::RemoteOnly)
    }

    pub fn uses_cache(self) -> bool {
        matches!(self, Self::Layered | Self::CacheOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Layered => "layered",
            Self::RemoteOnly => "remote",
            Self::CacheOnly => "cache",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "layered" => Ok(Self::Layered),
            "remote" | "remote_only" => Ok(Self::RemoteOnly),
            "cache" | "cache_only" => Ok(Self::CacheOnly),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownBackend(String),
    EmptyEndpoint,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownBackend(value) => write!(
                f,
                "unknown store backend `{value}`; expected layered|remote|cache"
            ),
            Self::EmptyEndpoint => write!(f, "remote endpoint cannot be empty"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlessingConfig {
    pub remote_endpoint: String,
    pub cache_db_path: PathBuf,
    pub backend: StoreBackend,
    pub request_timeout_ms: u64,
}

impl Default for BlessingConfig {
    fn default() -> Self {
        Self {
            remote_endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            cache_db_path: PathBuf::from(DEFAULT_CACHE_DB_FILE),
            backend: StoreBackend::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl BlessingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the environment with `overrides` shadowing it, e.g. CLI flags.
    pub fn from_env_with(overrides: &[(&str, String)]) -> Result<Self, ConfigError> {
        Self::from_lookup_with(overrides, |key| std::env::var(key).ok())
    }

    /// Layers `overrides` over `lookup`. An overridden key is never read from
    /// `lookup`, so a bad value there cannot fail the build.
    pub fn from_lookup_with(
        overrides: &[(&str, String)],
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match overrides.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => Some(value.clone()),
            None => lookup(key),
        })
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENV_REMOTE_URL) {
            config.remote_endpoint = endpoint.trim().to_string();
        }
        if config.remote_endpoint.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if let Some(path) = lookup(ENV_CACHE_DB).filter(|value| !value.trim().is_empty()) {
            config.cache_db_path = PathBuf::from(path.trim());
        }
        if let Some(backend) = lookup(ENV_BACKEND) {
            config.backend = backend.parse()?;
        }
        config.request_timeout_ms = lookup(ENV_HTTP_TIMEOUT_MS)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| REQUEST_TIMEOUT_RANGE_MS.contains(value))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BlessingConfig, ConfigError, StoreBackend, DEFAULT_REQUEST_TIMEOUT_MS, ENV_BACKEND,
        ENV_REMOTE_URL,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = BlessingConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config, BlessingConfig::default());
        assert_eq!(config.backend, StoreBackend::Layered);
    }

    #[test]
    fn reads_all_keys() {
        let config = BlessingConfig::from_lookup(lookup(&[
            ("BLESSING_REMOTE_URL", " https://example.com/api.php "),
            ("BLESSING_CACHE_DB", "/tmp/cache.db"),
            ("BLESSING_BACKEND", "CACHE"),
            ("BLESSING_HTTP_TIMEOUT_MS", "1500"),
        ]))
        .expect("config");
        assert_eq!(config.remote_endpoint, "https://example.com/api.php");
        assert_eq!(config.cache_db_path, PathBuf::from("/tmp/cache.db"));
        assert_eq!(config.backend, StoreBackend::CacheOnly);
        assert_eq!(config.request_timeout_ms, 1500);
    }

    #[test]
    fn out_of_range_timeout_falls_back_to_default() {
        for raw in ["5", "999999", "soon"] {
            let config =
                BlessingConfig::from_lookup(lookup(&[("BLESSING_HTTP_TIMEOUT_MS", raw)]))
                    .expect("config");
            assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        }
    }

    #[test]
    fn rejects_unknown_backend_and_empty_endpoint() {
        let err = BlessingConfig::from_lookup(lookup(&[("BLESSING_BACKEND", "cloud")]))
            .expect_err("unknown backend");
        assert_eq!(err, ConfigError::UnknownBackend("cloud".to_string()));

        let err = BlessingConfig::from_lookup(lookup(&[("BLESSING_REMOTE_URL", "  ")]))
            .expect_err("empty endpoint");
        assert_eq!(err, ConfigError::EmptyEndpoint);
    }

    #[test]
    fn overrides_shadow_bad_lookup_values() {
        let env = lookup(&[
            ("BLESSING_BACKEND", "bogus"),
            ("BLESSING_REMOTE_URL", " "),
            ("BLESSING_HTTP_TIMEOUT_MS", "1500"),
        ]);
        let config = BlessingConfig::from_lookup_with(
            &[
                (ENV_BACKEND, "cache".to_string()),
                (ENV_REMOTE_URL, "https://example.com/".to_string()),
            ],
            env,
        )
        .expect("overrides win");
        assert_eq!(config.backend, StoreBackend::CacheOnly);
        assert_eq!(config.remote_endpoint, "https://example.com/");
        assert_eq!(config.request_timeout_ms, 1500);

        let err = BlessingConfig::from_lookup_with(&[], lookup(&[("BLESSING_BACKEND", "bogus")]))
            .expect_err("no override");
        assert_eq!(err, ConfigError::UnknownBackend("bogus".to_string()));
    }
}
