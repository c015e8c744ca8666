//! Tag identifier validation.
//!
//! # Responsibility
//! - Reject malformed tag codes before any store is consulted.
//!
//! # Invariants
//! - A well-formed id is exactly 8 characters of `0-9` or `A-Z`.
//! - Input is never trimmed or case-folded; a tag either carries a valid code
//!   or it does not.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Fixed length of a tag code.
pub const BLESSING_ID_LEN: usize = 8;

static BLESSING_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Z]{8}$").expect("valid blessing id regex"));

/// Returns whether `raw` has the shape of a tag code.
pub fn is_well_formed(raw: &str) -> bool {
    BLESSING_ID_RE.is_match(raw)
}

/// Validated tag identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlessingId(String);

/// Rejection returned by [`BlessingId::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedIdentifier(pub String);

impl Display for MalformedIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "malformed identifier `{}`: expected {BLESSING_ID_LEN} characters of 0-9 or A-Z",
            self.0
        )
    }
}

impl std::error::Error for MalformedIdentifier {}

impl BlessingId {
    /// Parses a raw tag code.
    ///
    /// # Errors
    /// - Returns [`MalformedIdentifier`] carrying the raw input when the shape
    ///   check fails.
    pub fn parse(raw: &str) -> Result<Self, MalformedIdentifier> {
        if is_well_formed(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(MalformedIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BlessingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BlessingId {
    type Error = MalformedIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BlessingId> for String {
    fn from(value: BlessingId) -> Self {
        value.0
    }
}

impl AsRef<str> for BlessingId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{is_well_formed, BlessingId};

    #[test]
    fn accepts_uppercase_alphanumeric_codes() {
        assert!(is_well_formed("A1B2C3D4"));
        assert!(is_well_formed("00000000"));
        assert!(is_well_formed("ZZZZZZZZ"));
    }

    #[test]
    fn rejects_wrong_length_case_and_symbols() {
        for raw in [
            "", "ab", "a1b2c3d4", "A1B2C3D", "A1B2C3D45", "A1B2-3D4", " A1B2C3D4", "A1B2C3D4\n",
            "Ä1B2C3D4",
        ] {
            assert!(!is_well_formed(raw), "`{raw}` should be rejected");
        }
    }

    #[test]
    fn parse_keeps_raw_input_in_error() {
        let err = BlessingId::parse("ab").expect_err("short id must fail");
        assert_eq!(err.0, "ab");
        assert!(err.to_string().contains("`ab`"));
    }

    #[test]
    fn deserialization_validates_shape() {
        let ok: BlessingId = serde_json::from_str("\"A1B2C3D4\"").expect("valid id");
        assert_eq!(ok.as_str(), "A1B2C3D4");
        assert!(serde_json::from_str::<BlessingId>("\"nope\"").is_err());
    }
}
