//! Remote record store contract and HTTP client.
//!
//! # Responsibility
//! - Fetch the shared record array and upsert single records over HTTP.
//!
//! # Invariants
//! - `upsert` is a whole-record replace matched on id; the read-modify-write
//!   of the shared document happens only inside the store.
//! - Blocking HTTP work never runs on an async worker thread.

use crate::model::blessing::BlessingRecord;
use crate::store::wire::{parse_record_array, parse_upsert_response, UpsertAck};
use crate::store::{run_blocking, StoreError, StoreResult};
use async_trait::async_trait;
use std::time::Duration;

/// Authoritative record store shared across devices.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns every record; an empty store yields an empty vector.
    async fn fetch_all(&self) -> StoreResult<Vec<BlessingRecord>>;

    /// Replaces the record with the same id, or appends it.
    async fn upsert(&self, record: &BlessingRecord) -> StoreResult<UpsertAck>;
}

/// Remote store reached over JSON/HTTP.
#[derive(Clone)]
pub struct HttpRemoteStore {
    agent: ureq::Agent,
    endpoint: String,
}

impl HttpRemoteStore {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_all(&self) -> StoreResult<Vec<BlessingRecord>> {
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let body = run_blocking("fetch_all", move || {
            let response = agent
                .get(&endpoint)
                .set("Accept", "application/json")
                .call()
                .map_err(transport_error)?;
            read_body(response)
        })
        .await?;
        parse_record_array(&body)
    }

    async fn upsert(&self, record: &BlessingRecord) -> StoreResult<UpsertAck> {
        let payload = serde_json::to_string(record).map_err(StoreError::Encode)?;
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let body = run_blocking("upsert", move || {
            let response = agent
                .post(&endpoint)
                .set("Content-Type", "application/json")
                .send_string(&payload)
                .map_err(transport_error)?;
            read_body(response)
        })
        .await?;
        parse_upsert_response(&body)
    }
}

fn read_body(response: ureq::Response) -> StoreResult<String> {
    response
        .into_string()
        .map_err(|err| StoreError::Transport(format!("failed to read response body: {err}")))
}

fn transport_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, _) => {
            StoreError::Transport(format!("remote store answered HTTP {status}"))
        }
        ureq::Error::Transport(transport) => StoreError::Transport(transport.to_string()),
    }
}
