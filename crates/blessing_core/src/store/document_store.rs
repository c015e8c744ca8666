//! File-backed authoritative record document.
//!
//! # Responsibility
//! - Keep every device's records in one JSON array on disk.
//! - Serve fetch-all and upsert-one with whole-document semantics.
//!
//! # Invariants
//! - Every upsert reads, mutates and rewrites the document under one async
//!   lock, so concurrent upserts to different ids never drop each other.
//! - Rewrites go through a temp file and a rename; readers never observe a
//!   half-written document.
//! - A missing, empty or unparseable document reads as an empty array.
//! - Entries are stored verbatim, so fields beyond the record shape survive.

use crate::model::blessing::BlessingRecord;
use crate::store::remote_store::RemoteStore;
use crate::store::wire::{decode_records, UpsertAck, ID_FIELD, MISSING_ID_MESSAGE};
use crate::store::{StoreError, StoreResult};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Upsert failures of the document store.
#[derive(Debug)]
pub enum DocumentError {
    /// Input is not an object with a string `nfc_id`.
    MissingId,
    Io(std::io::Error),
    Encode(serde_json::Error),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => f.write_str(MISSING_ID_MESSAGE),
            Self::Io(err) => write!(f, "document io failed: {err}"),
            Self::Encode(err) => write!(f, "document encode failed: {err}"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingId => None,
            Self::Io(err) => Some(err),
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for DocumentError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// The shared record document.
pub struct JsonDocumentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every raw entry.
    ///
    /// # Errors
    /// - Returns I/O errors other than a missing file.
    pub async fn load_document(&self) -> Result<Vec<Value>, DocumentError> {
        read_entries(&self.path).await
    }

    /// Replaces the first entry whose `nfc_id` equals the input's, or appends
    /// the input, and returns the input as stored. Later entries with the
    /// same `nfc_id` are dropped.
    ///
    /// # Errors
    /// - `MissingId` when the input has no string `nfc_id`; the document is
    ///   left untouched.
    /// - `Io` / `Encode` when the document cannot be read or rewritten.
    pub async fn upsert_document(&self, input: Value) -> Result<Value, DocumentError> {
        let id = input
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or(DocumentError::MissingId)?
            .to_string();

        let _guard = self.write_lock.lock().await;
        let mut entries = read_entries(&self.path).await?;
        let before = entries.len();
        let mut pending = Some(input.clone());
        entries.retain_mut(|entry| {
            if entry.get(ID_FIELD).and_then(Value::as_str) != Some(id.as_str()) {
                return true;
            }
            match pending.take() {
                Some(replacement) => {
                    *entry = replacement;
                    true
                }
                None => false,
            }
        });
        let replaced = pending.is_none();
        if let Some(entry) = pending {
            entries.push(entry);
        }

        write_entries(&self.path, &entries).await?;
        debug!(
            "event=document_upsert module=document status=ok replaced={} dropped_duplicates={} entries={}",
            replaced,
            (before + usize::from(!replaced)).saturating_sub(entries.len()),
            entries.len()
        );
        Ok(input)
    }
}

#[async_trait]
impl RemoteStore for JsonDocumentStore {
    async fn fetch_all(&self) -> StoreResult<Vec<BlessingRecord>> {
        let entries = self.load_document().await.map_err(document_to_store_error)?;
        Ok(decode_records(entries))
    }

    async fn upsert(&self, record: &BlessingRecord) -> StoreResult<UpsertAck> {
        let input = serde_json::to_value(record).map_err(StoreError::Encode)?;
        let echoed = self
            .upsert_document(input)
            .await
            .map_err(document_to_store_error)?;
        Ok(UpsertAck { echoed })
    }
}

fn document_to_store_error(err: DocumentError) -> StoreError {
    match err {
        DocumentError::MissingId => StoreError::Rejected(MISSING_ID_MESSAGE.to_string()),
        DocumentError::Io(err) => StoreError::Io(err),
        DocumentError::Encode(err) => StoreError::Encode(err),
    }
}

async fn read_entries(path: &Path) -> Result<Vec<Value>, DocumentError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(entries)) => Ok(entries),
        Ok(_) | Err(_) => {
            warn!("event=document_read module=document status=degraded reason=not_an_array");
            Ok(Vec::new())
        }
    }
}

async fn write_entries(path: &Path, entries: &[Value]) -> Result<(), DocumentError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec(entries).map_err(DocumentError::Encode)?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DocumentError, JsonDocumentStore};
    use serde_json::json;

    #[tokio::test]
    async fn missing_and_garbage_documents_read_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDocumentStore::new(dir.path().join("remote_db.json"));
        assert!(store.load_document().await.expect("missing").is_empty());

        std::fs::write(store.path(), "").expect("write empty");
        assert!(store.load_document().await.expect("empty").is_empty());

        std::fs::write(store.path(), "null").expect("write null");
        assert!(store.load_document().await.expect("null").is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_keeps_extra_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDocumentStore::new(dir.path().join("remote_db.json"));

        store
            .upsert_document(json!({"nfc_id": "A1B2C3D4", "text": "one", "extra": 1}))
            .await
            .expect("insert");
        store
            .upsert_document(json!({"nfc_id": "B1B2C3D4", "text": "two"}))
            .await
            .expect("insert");
        store
            .upsert_document(json!({"nfc_id": "A1B2C3D4", "text": "three", "extra": 2}))
            .await
            .expect("replace");

        let entries = store.load_document().await.expect("load");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["text"], "three");
        assert_eq!(entries[0]["extra"], 2);
    }

    #[tokio::test]
    async fn upsert_collapses_duplicate_entries_for_the_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDocumentStore::new(dir.path().join("remote_db.json"));
        std::fs::write(
            store.path(),
            r#"[{"nfc_id":"A1B2C3D4","text":"old"},{"nfc_id":"B1B2C3D4","text":"other"},{"nfc_id":"A1B2C3D4","text":"dup"}]"#,
        )
        .expect("seed duplicates");

        store
            .upsert_document(json!({"nfc_id": "A1B2C3D4", "text": "new"}))
            .await
            .expect("upsert");

        let entries = store.load_document().await.expect("load");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["text"], "new");
        assert_eq!(entries[1]["nfc_id"], "B1B2C3D4");
    }

    #[tokio::test]
    async fn missing_id_leaves_document_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDocumentStore::new(dir.path().join("remote_db.json"));
        store
            .upsert_document(json!({"nfc_id": "A1B2C3D4", "text": "one"}))
            .await
            .expect("insert");
        let before = std::fs::read(store.path()).expect("read");

        let err = store
            .upsert_document(json!({"text": "orphan"}))
            .await
            .expect_err("missing id");
        assert!(matches!(err, DocumentError::MissingId));
        assert_eq!(err.to_string(), "Missing nfc_id");
        assert_eq!(std::fs::read(store.path()).expect("read"), before);
    }

    #[tokio::test]
    async fn non_ascii_text_is_written_unescaped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDocumentStore::new(dir.path().join("remote_db.json"));
        store
            .upsert_document(json!({"nfc_id": "A1B2C3D4", "text": "平安喜乐"}))
            .await
            .expect("insert");
        let raw = std::fs::read_to_string(store.path()).expect("read");
        assert!(raw.contains("平安喜乐"));
        assert!(!raw.contains("\\u"));
    }
}
