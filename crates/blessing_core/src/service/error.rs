//! Caller-facing error taxonomy of the blessing subsystem.

use crate::model::blessing::BlessingValidationError;
use crate::model::identifier::BlessingId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors and degradations reported by resolve and write.
///
/// Read-side degradations (`RemoteUnavailable`, `MalformedRemoteResponse`,
/// `CacheCorrupt`, `CacheUnavailable`) are carried inside a successful
/// `Resolution`; only write failures are returned to the end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlessingError {
    /// Raw id failed the shape check; no store was consulted.
    InvalidIdentifier(String),
    /// Well-formed id absent from every source.
    UnknownIdentifier(BlessingId),
    RemoteUnavailable(String),
    MalformedRemoteResponse(String),
    /// Upsert failed or was rejected; local state is unchanged.
    RemoteWriteFailed(String),
    /// Persisted cache blob was unparseable and got reset.
    CacheCorrupt,
    CacheUnavailable(String),
    Validation(BlessingValidationError),
}

impl BlessingError {
    /// Whether the end user should see this error and retry.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::RemoteWriteFailed(_) | Self::CacheUnavailable(_) | Self::Validation(_)
        )
    }

    /// Stable machine-readable code for envelopes and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::UnknownIdentifier(_) => "unknown_identifier",
            Self::RemoteUnavailable(_) => "remote_unavailable",
            Self::MalformedRemoteResponse(_) => "malformed_remote_response",
            Self::RemoteWriteFailed(_) => "remote_write_failed",
            Self::CacheCorrupt => "cache_corrupt",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::Validation(_) => "validation_failed",
        }
    }
}

impl Display for BlessingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(raw) => write!(f, "invalid identifier `{raw}`"),
            Self::UnknownIdentifier(id) => write!(f, "unknown identifier `{id}`"),
            Self::RemoteUnavailable(reason) => write!(f, "remote store unavailable: {reason}"),
            Self::MalformedRemoteResponse(reason) => {
                write!(f, "malformed remote response: {reason}")
            }
            Self::RemoteWriteFailed(reason) => {
                write!(f, "save failed, check connection and retry: {reason}")
            }
            Self::CacheCorrupt => write!(f, "local cache was corrupt and has been reset"),
            Self::CacheUnavailable(reason) => write!(f, "local cache unavailable: {reason}"),
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BlessingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BlessingValidationError> for BlessingError {
    fn from(value: BlessingValidationError) -> Self {
        Self::Validation(value)
    }
}
