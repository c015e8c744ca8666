//! Per-visit session state.
//!
//! # Responsibility
//! - Hold the resolved record, the unlock flag and the author's draft for
//!   one identifier.
//! - Gate blessing text behind the unlock check.
//!
//! # Invariants
//! - A session belongs to exactly one identifier and is never reused for
//!   another.
//! - `unlocked` starts false only when the resolved blessing is protected.
//! - The resolved record changes only after an acknowledged write.

use crate::model::blessing::{BlessingRecord, BlessingValidationError};
use crate::model::identifier::BlessingId;
use crate::service::error::BlessingError;
use crate::service::password::synthesize_password;
use crate::service::resolver::Resolution;
use crate::service::writer::{WriteRequest, Writer};
use crate::store::cache_store::CacheStore;
use crate::store::remote_store::RemoteStore;
use log::{debug, info};
use uuid::Uuid;

/// In-progress edit of a blessing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlessingDraft {
    text: String,
    password_enabled: bool,
    password: Option<String>,
}

impl BlessingDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefills a draft from an existing record.
    pub fn from_record(record: &BlessingRecord) -> Self {
        Self {
            text: record.blessing_text().unwrap_or_default().to_string(),
            password_enabled: record.password_enabled,
            password: record.password.clone(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn password_enabled(&self) -> bool {
        self.password_enabled
    }

    /// Toggles protection. The first time it is switched on a code is drawn
    /// and kept for the rest of the draft, across further toggles.
    pub fn set_password_enabled(&mut self, enabled: bool) {
        if enabled && self.password.is_none() {
            self.password = Some(synthesize_password());
        }
        self.password_enabled = enabled;
    }

    /// Code the author shares with the reader.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|_| self.password_enabled)
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(password.into());
    }

    pub fn to_request(&self, id: &BlessingId) -> WriteRequest {
        WriteRequest {
            id: id.as_str().to_string(),
            text: self.text.clone(),
            password_enabled: self.password_enabled,
            password: self.password().map(str::to_string),
        }
    }
}

/// Session for one resolved identifier.
#[derive(Debug, Clone)]
pub struct BlessingSession {
    session_id: Uuid,
    resolution: Resolution,
    unlocked: bool,
    failed_attempts: u32,
}

impl BlessingSession {
    pub fn new(resolution: Resolution) -> Self {
        let session = Self {
            session_id: Uuid::new_v4(),
            unlocked: !requires_unlock(&resolution),
            resolution,
            failed_attempts: 0,
        };
        debug!(
            "event=session_open module=session status=ok session_id={} locked={}",
            session.session_id,
            session.is_locked()
        );
        session
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn id(&self) -> &BlessingId {
        &self.resolution.id
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn has_blessing(&self) -> bool {
        self.resolution.has_blessing()
    }

    pub fn is_locked(&self) -> bool {
        !self.unlocked
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Checks `attempt` against the blessing's code and unlocks on a match.
    pub fn try_unlock(&mut self, attempt: &str) -> bool {
        if self.unlocked {
            return true;
        }
        let matched = self
            .resolution
            .record()
            .is_some_and(|record| record.password_matches(attempt));
        if matched {
            self.unlocked = true;
        } else {
            self.failed_attempts += 1;
        }
        info!(
            "event=session_unlock module=session status={} session_id={} failed_attempts={}",
            if matched { "ok" } else { "rejected" },
            self.session_id,
            self.failed_attempts
        );
        matched
    }

    /// Blessing text, hidden while the session is locked.
    pub fn visible_text(&self) -> Option<&str> {
        if !self.unlocked {
            return None;
        }
        self.resolution
            .record()
            .and_then(BlessingRecord::blessing_text)
    }

    /// Starts an edit; locked blessings cannot be edited.
    pub fn begin_edit(&self) -> Option<BlessingDraft> {
        if !self.unlocked {
            return None;
        }
        Some(
            self.resolution
                .record()
                .map(BlessingDraft::from_record)
                .unwrap_or_default(),
        )
    }

    /// Persists `draft` and, only once acknowledged, adopts the stored record.
    ///
    /// # Errors
    /// - Any writer error; the session is left unchanged.
    pub async fn save<R, C>(
        &mut self,
        writer: &Writer<R, C>,
        draft: &BlessingDraft,
    ) -> Result<&BlessingRecord, BlessingError>
    where
        R: RemoteStore,
        C: CacheStore,
    {
        let ack = writer.write(draft.to_request(self.id())).await?;
        self.resolution = Resolution::from_written(ack.id, ack.record, ack.stored_in);
        self.unlocked = true;
        self.failed_attempts = 0;
        self.resolution
            .record()
            .ok_or(BlessingError::Validation(BlessingValidationError::EmptyText))
    }

    /// Re-locks the blessing and clears attempt counters, as when the reader
    /// navigates away and back.
    pub fn reset(&mut self) {
        self.unlocked = !requires_unlock(&self.resolution);
        self.failed_attempts = 0;
    }
}

fn requires_unlock(resolution: &Resolution) -> bool {
    resolution
        .record()
        .is_some_and(BlessingRecord::requires_password)
}
