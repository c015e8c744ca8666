//! Blessing record model.
//!
//! # Responsibility
//! - Define the record shape persisted by the static dataset, the local cache
//!   and the remote document.
//! - Own the one canonical parser for boolean-like `passwordEnabled` values.
//!
//! # Invariants
//! - Absent, blank and `"NULL"` text all deserialize to `text = None`.
//! - `password_enabled` is always a real `bool` after deserialization.
//! - Write paths call `BlessingRecord::validate()` before persisting.

use crate::model::identifier::{is_well_formed, BlessingId};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Text value some producers store instead of omitting the field.
pub const NULL_TEXT_SENTINEL: &str = "NULL";
/// Longest blessing accepted by the writer, in characters.
pub const MAX_BLESSING_CHARS: usize = 200;
/// Length of an unlock code.
pub const PASSWORD_LEN: usize = 4;

/// One blessing bound to one physical tag.
///
/// Serialized with the field names of the shared remote document
/// (`nfc_id`, `text`, `passwordEnabled`, `password`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlessingRecord {
    /// Tag code. Kept as plain text so a stray entry in a shared document
    /// cannot fail a whole snapshot; matching is by string equality.
    #[serde(rename = "nfc_id", alias = "nfcId", alias = "id")]
    pub id: String,
    #[serde(
        default,
        alias = "blessingText",
        alias = "blessing_text",
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<String>,
    #[serde(
        rename = "passwordEnabled",
        alias = "password_enabled",
        default,
        deserialize_with = "deserialize_flag"
    )]
    pub password_enabled: bool,
    /// Unlock code; only meaningful when `password_enabled`.
    #[serde(
        default,
        deserialize_with = "deserialize_password",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,
}

/// Validation failures for records about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlessingValidationError {
    MalformedId(String),
    EmptyText,
    TextTooLong { max: usize, actual: usize },
    MissingPassword,
    InvalidPassword,
    UnexpectedPassword,
}

impl Display for BlessingValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedId(value) => write!(f, "malformed identifier `{value}`"),
            Self::EmptyText => write!(f, "blessing text must not be empty"),
            Self::TextTooLong { max, actual } => {
                write!(f, "blessing text has {actual} characters; maximum is {max}")
            }
            Self::MissingPassword => write!(f, "password protection enabled without a password"),
            Self::InvalidPassword => write!(f, "password must be exactly {PASSWORD_LEN} digits"),
            Self::UnexpectedPassword => {
                write!(f, "password present while password protection is disabled")
            }
        }
    }
}

impl Error for BlessingValidationError {}

impl BlessingRecord {
    /// Creates an unprotected record.
    pub fn new(id: &BlessingId, text: impl Into<String>) -> Self {
        Self {
            id: id.as_str().to_string(),
            text: normalize_text(&text.into()),
            password_enabled: false,
            password: None,
        }
    }

    /// Creates a record with no blessing content, as the static dataset
    /// lists blank tags.
    pub fn blank(id: &BlessingId) -> Self {
        Self {
            id: id.as_str().to_string(),
            text: None,
            password_enabled: false,
            password: None,
        }
    }

    /// Returns a copy protected by `password`.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password_enabled = true;
        self.password = Some(password.into());
        self
    }

    /// Returns the blessing text when one exists.
    pub fn blessing_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|text| normalize_text(text).is_some())
    }

    /// A record with no usable text is "no blessing", regardless of the
    /// password fields.
    pub fn has_blessing(&self) -> bool {
        self.blessing_text().is_some()
    }

    pub fn requires_password(&self) -> bool {
        self.password_enabled
    }

    /// A protected record is complete only once its password is known.
    pub fn is_complete(&self) -> bool {
        !self.password_enabled || self.password.is_some()
    }

    /// Equality check used by the unlock prompt.
    ///
    /// Unprotected records accept any attempt. Protected records without a
    /// password accept nothing.
    pub fn password_matches(&self, attempt: &str) -> bool {
        if !self.password_enabled {
            return true;
        }
        match self.password.as_deref() {
            Some(password) => password == attempt.trim(),
            None => false,
        }
    }

    /// Validates write-side rules.
    ///
    /// # Errors
    /// - `MalformedId` when `id` is not a tag code.
    /// - `EmptyText` / `TextTooLong` for missing or oversized content.
    /// - `MissingPassword` / `InvalidPassword` / `UnexpectedPassword` when the
    ///   password fields disagree with `password_enabled`.
    pub fn validate(&self) -> Result<(), BlessingValidationError> {
        if !is_well_formed(&self.id) {
            return Err(BlessingValidationError::MalformedId(self.id.clone()));
        }

        let text = self
            .blessing_text()
            .ok_or(BlessingValidationError::EmptyText)?;
        let actual = text.chars().count();
        if actual > MAX_BLESSING_CHARS {
            return Err(BlessingValidationError::TextTooLong {
                max: MAX_BLESSING_CHARS,
                actual,
            });
        }

        match (self.password_enabled, self.password.as_deref()) {
            (true, None) => Err(BlessingValidationError::MissingPassword),
            (true, Some(password)) if !is_valid_password(password) => {
                Err(BlessingValidationError::InvalidPassword)
            }
            (false, Some(_)) => Err(BlessingValidationError::UnexpectedPassword),
            _ => Ok(()),
        }
    }
}

/// Canonical parser for boolean-like flags found in any source.
///
/// Accepts `true`/`false` in any letter case, surrounded by whitespace.
pub fn parse_flag(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Maps blank text and the `"NULL"` sentinel to `None`.
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NULL_TEXT_SENTINEL {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Returns whether `value` is a well-formed unlock code.
pub fn is_valid_password(value: &str) -> bool {
    value.len() == PASSWORD_LEN && value.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PasswordRepr {
    Text(String),
    Number(u64),
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|text| normalize_text(&text)))
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FlagRepr>::deserialize(deserializer)? {
        None => Ok(false),
        Some(FlagRepr::Bool(value)) => Ok(value),
        Some(FlagRepr::Text(value)) => parse_flag(&value).ok_or_else(|| {
            D::Error::custom(format!("invalid passwordEnabled value `{value}`"))
        }),
    }
}

fn deserialize_password<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let password = match Option::<PasswordRepr>::deserialize(deserializer)? {
        None => None,
        Some(PasswordRepr::Text(value)) => Some(value.trim().to_string()),
        Some(PasswordRepr::Number(value)) => Some(format!("{value:0width$}", width = PASSWORD_LEN)),
    };
    Ok(password.filter(|value| !value.is_empty()))
}
