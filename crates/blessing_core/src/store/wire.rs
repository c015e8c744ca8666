//! JSON wire shapes of the remote record store.
//!
//! # Invariants
//! - `GET` answers with a JSON array, never `null`.
//! - `POST` answers HTTP 200 with an in-band `status` of `success` or `error`.

use crate::model::blessing::BlessingRecord;
use crate::store::{StoreError, StoreResult};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field every posted record must carry.
pub const ID_FIELD: &str = "nfc_id";
/// In-band error message for a post without an id.
pub const MISSING_ID_MESSAGE: &str = "Missing nfc_id";

/// Body returned by an upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UpsertResponse {
    /// Echoes the stored input.
    Success { data: Value },
    Error { message: String },
}

/// Acknowledgment of an accepted upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertAck {
    pub echoed: Value,
}

/// Decodes a fetch-all body.
///
/// # Errors
/// - `MalformedResponse` when the body is not a JSON array.
///
/// Array entries that are not records are skipped, so one stray entry in the
/// shared document cannot hide every other record.
pub fn parse_record_array(body: &str) -> StoreResult<Vec<BlessingRecord>> {
    let entries: Vec<Value> = serde_json::from_str(body).map_err(|err| {
        StoreError::MalformedResponse(format!("expected a JSON array of records: {err}"))
    })?;
    Ok(decode_records(entries))
}

/// Decodes raw document entries, skipping the ones that are not records.
pub fn decode_records(entries: Vec<Value>) -> Vec<BlessingRecord> {
    let total = entries.len();
    let records: Vec<BlessingRecord> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if records.len() != total {
        warn!(
            "event=remote_decode module=remote status=degraded skipped_entries={}",
            total - records.len()
        );
    }
    records
}

/// Decodes an upsert body into an acknowledgment.
///
/// # Errors
/// - `Rejected` for an in-band `error` status.
/// - `MalformedResponse` when the body is not an upsert envelope.
pub fn parse_upsert_response(body: &str) -> StoreResult<UpsertAck> {
    match serde_json::from_str::<UpsertResponse>(body) {
        Ok(UpsertResponse::Success { data }) => Ok(UpsertAck { echoed: data }),
        Ok(UpsertResponse::Error { message }) => Err(StoreError::Rejected(message)),
        Err(err) => Err(StoreError::MalformedResponse(format!(
            "expected an upsert envelope: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_record_array, parse_upsert_response, UpsertResponse, MISSING_ID_MESSAGE};
    use crate::store::StoreError;
    use serde_json::json;

    #[test]
    fn record_array_rejects_null_and_objects() {
        assert!(matches!(
            parse_record_array("null"),
            Err(StoreError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_record_array(r#"{"nfc_id":"A1B2C3D4"}"#),
            Err(StoreError::MalformedResponse(_))
        ));
        assert!(parse_record_array("[]").expect("empty array").is_empty());
    }

    #[test]
    fn record_array_skips_stray_entries() {
        let records = parse_record_array(
            r#"[{"nfc_id":"A1B2C3D4","text":"hi"}, 7, {"text":"no id"}]"#,
        )
        .expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "A1B2C3D4");
    }

    #[test]
    fn upsert_envelopes_match_wire_contract() {
        let success = serde_json::to_value(UpsertResponse::Success {
            data: json!({"nfc_id": "A1B2C3D4"}),
        })
        .expect("serialize");
        assert_eq!(success, json!({"status": "success", "data": {"nfc_id": "A1B2C3D4"}}));

        let error = serde_json::to_value(UpsertResponse::Error {
            message: MISSING_ID_MESSAGE.to_string(),
        })
        .expect("serialize");
        assert_eq!(error, json!({"status": "error", "message": "Missing nfc_id"}));
    }

    #[test]
    fn upsert_error_status_is_rejection() {
        let err = parse_upsert_response(r#"{"status":"error","message":"Missing nfc_id"}"#)
            .expect_err("in-band error");
        assert!(matches!(err, StoreError::Rejected(message) if message == MISSING_ID_MESSAGE));

        let ack = parse_upsert_response(r#"{"status":"success","data":{"nfc_id":"A1B2C3D4"}}"#)
            .expect("ack");
        assert_eq!(ack.echoed["nfc_id"], "A1B2C3D4");

        assert!(matches!(
            parse_upsert_response("<html>"),
            Err(StoreError::MalformedResponse(_))
        ));
    }
}
