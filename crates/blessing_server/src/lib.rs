//! HTTP front of the shared record document.
//!
//! # Responsibility
//! - Serve fetch-all (`GET`) and upsert-one (`POST`) over JSON.
//! - Answer at `/` and `/api.php` so existing tag URLs keep working.
//!
//! # Invariants
//! - `GET` always answers with a JSON array.
//! - `POST` failures are reported in-band with HTTP 200.
//! - Every response carries permissive CORS headers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::StatusCode;
use axum::middleware::map_response;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use blessing_core::{DocumentError, JsonDocumentStore, UpsertResponse, MISSING_ID_MESSAGE};
use log::{error, info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const ENV_SERVER_BIND: &str = "BLESSING_SERVER_BIND";
pub const ENV_DOCUMENT_PATH: &str = "BLESSING_DOCUMENT_PATH";
pub const ENV_LOG_DIR: &str = blessing_core::logging::ENV_LOG_DIR;
pub const ENV_LOG_LEVEL: &str = blessing_core::logging::ENV_LOG_LEVEL;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DOCUMENT_PATH: &str = "remote_db.json";
pub const PERSIST_FAILED_MESSAGE: &str = "failed to persist record";

/// Process settings of the record server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub document_path: PathBuf,
    /// File logging is off when unset.
    pub log_dir: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerConfigError {
    InvalidBind(String),
}

impl Display for ServerConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBind(value) => {
                write!(f, "{ENV_SERVER_BIND} is not a socket address: `{value}`")
            }
        }
    }
}

impl Error for ServerConfigError {}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ServerConfigError> {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_raw = non_blank(ENV_SERVER_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ServerConfigError::InvalidBind(bind_raw.clone()))?;
        let document_path = non_blank(ENV_DOCUMENT_PATH)
            .map(|value| PathBuf::from(value.trim()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCUMENT_PATH));
        let log_level = non_blank(ENV_LOG_LEVEL)
            .unwrap_or_else(|| blessing_core::default_log_level().to_string());

        Ok(Self {
            bind,
            document_path,
            log_dir: non_blank(ENV_LOG_DIR),
            log_level,
        })
    }
}

/// Routes of the record server over one shared document.
pub fn router(store: Arc<JsonDocumentStore>) -> Router {
    Router::new()
        .route(
            "/",
            get(list_records).post(upsert_record).options(preflight),
        )
        .route(
            "/api.php",
            get(list_records).post(upsert_record).options(preflight),
        )
        .layer(map_response(with_cors_headers))
        .with_state(store)
}

/// Serves `store` on `listener` until `shutdown` resolves.
pub async fn run(
    listener: TcpListener,
    store: Arc<JsonDocumentStore>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(
        "event=server_start module=server status=ok addr={} document={}",
        addr,
        store.path().display()
    );
    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("event=server_stop module=server status=ok addr={}", addr);
    Ok(())
}

async fn list_records(State(store): State<Arc<JsonDocumentStore>>) -> (StatusCode, Json<Value>) {
    match store.load_document().await {
        Ok(entries) => {
            info!(
                "event=records_list module=server status=ok entries={}",
                entries.len()
            );
            (StatusCode::OK, Json(Value::Array(entries)))
        }
        Err(err) => {
            error!(
                "event=records_list module=server status=error error={}",
                err
            );
            (StatusCode::SERVICE_UNAVAILABLE, Json(Value::Array(Vec::new())))
        }
    }
}

async fn upsert_record(
    State(store): State<Arc<JsonDocumentStore>>,
    body: Bytes,
) -> Json<UpsertResponse> {
    let Ok(input) = serde_json::from_slice::<Value>(&body) else {
        warn!("event=record_upsert module=server status=error reason=invalid_json");
        return missing_id();
    };

    match store.upsert_document(input).await {
        Ok(data) => {
            info!("event=record_upsert module=server status=ok");
            Json(UpsertResponse::Success { data })
        }
        Err(DocumentError::MissingId) => {
            warn!("event=record_upsert module=server status=error reason=missing_id");
            missing_id()
        }
        Err(err) => {
            error!(
                "event=record_upsert module=server status=error error={}",
                err
            );
            Json(UpsertResponse::Error {
                message: PERSIST_FAILED_MESSAGE.to_string(),
            })
        }
    }
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn with_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn missing_id() -> Json<UpsertResponse> {
    Json(UpsertResponse::Error {
        message: MISSING_ID_MESSAGE.to_string(),
    })
}
