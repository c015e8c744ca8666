//! FFI use-case API for the Flutter reader and author screens.
//!
//! # Responsibility
//! - Expose session-level resolve/unlock/save calls to Dart via FRB.
//! - Flatten core results into plain envelopes with stable error codes.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - One session is active at a time; opening another id replaces it.
//! - The session lock is never held across network or database I/O, so the
//!   sync reader calls cannot stall behind a save.
//! - Blessing text leaves Rust only while the session is unlocked; the
//!   unlock code leaves Rust only in the author's save response.

use blessing_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    is_well_formed as is_well_formed_inner, ping as ping_inner, BlessingConfig, BlessingError,
    BlessingService, BlessingSession, HttpRemoteStore, ResolveOutcome, SqliteCacheStore,
};
use blessing_core::config::{ENV_BACKEND, ENV_CACHE_DB, ENV_REMOTE_URL};
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::runtime::Runtime;

type Service = BlessingService<HttpRemoteStore, SqliteCacheStore>;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static SERVICE: Mutex<Option<Arc<Service>>> = Mutex::new(None);
static SESSION: Mutex<Option<BlessingSession>> = Mutex::new(None);

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Sync call; may create the log directory.
/// - Idempotent for the same `level + log_dir`.
/// - Returns empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Shape check for a tag code read from the URL.
#[flutter_rust_bridge::frb(sync)]
pub fn is_well_formed_id(raw_id: String) -> bool {
    is_well_formed_inner(&raw_id)
}

/// Points the core at a remote store and cache database.
///
/// Unset arguments fall back to the `BLESSING_*` environment. Replaces any
/// previous configuration and closes the active session.
///
/// # FFI contract
/// - Sync call; opens the cache database.
/// - Returns empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn configure(
    remote_url: Option<String>,
    cache_db_path: Option<String>,
    backend: Option<String>,
) -> String {
    match build_service(remote_url, cache_db_path, backend) {
        Ok(service) => {
            *lock(&SERVICE) = Some(Arc::new(service));
            *lock(&SESSION) = None;
            String::new()
        }
        Err(message) => message,
    }
}

/// Reader-facing view of the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlessingView {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Normalized tag code, when one was resolved.
    pub nfc_id: Option<String>,
    /// `blessing|no_blessing|unknown`, or `none` when no session exists.
    pub state: String,
    pub locked: bool,
    /// Blessing text; hidden while locked.
    pub text: Option<String>,
    /// `remote|cache|static`.
    pub source: Option<String>,
    /// Codes of the sources that failed during resolve.
    pub degraded: Vec<String>,
    pub failed_attempts: u32,
    /// Stable error code when `ok` is false.
    pub error_code: Option<String>,
    pub message: String,
}

impl BlessingView {
    fn from_session(session: &BlessingSession, message: impl Into<String>) -> Self {
        let resolution = session.resolution();
        let state = match resolution.outcome {
            ResolveOutcome::Blessing(_) => "blessing",
            ResolveOutcome::NoBlessing(_) => "no_blessing",
            ResolveOutcome::Unknown => "unknown",
        };
        Self {
            ok: true,
            nfc_id: Some(session.id().to_string()),
            state: state.to_string(),
            locked: session.is_locked(),
            text: session.visible_text().map(str::to_string),
            source: Some(resolution.source.as_str().to_string()),
            degraded: resolution
                .degraded
                .iter()
                .map(|err| err.code().to_string())
                .collect(),
            failed_attempts: session.failed_attempts(),
            error_code: None,
            message: message.into(),
        }
    }

    fn no_session() -> Self {
        Self::failure("no_session", "No blessing is open.")
    }

    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            nfc_id: None,
            state: "none".to_string(),
            locked: false,
            text: None,
            source: None,
            degraded: Vec::new(),
            failed_attempts: 0,
            error_code: Some(code.to_string()),
            message: message.into(),
        }
    }

    fn from_error(err: &BlessingError) -> Self {
        Self::failure(err.code(), err.to_string())
    }
}

/// Author-facing result of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveResponse {
    pub ok: bool,
    /// Session view after the save; unchanged on failure.
    pub view: BlessingView,
    /// Unlock code to share with the reader, when protection is on.
    pub password: Option<String>,
    pub error_code: Option<String>,
    pub message: String,
}

impl SaveResponse {
    fn failure(view: BlessingView, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            view,
            password: None,
            error_code: Some(code.to_string()),
            message: message.into(),
        }
    }
}

/// Resolves `raw_id` and makes it the active session.
///
/// # FFI contract
/// - Async call (FRB worker thread); performs network and DB I/O.
/// - Malformed ids fail with `invalid_identifier` before any I/O.
/// - Remote failures degrade to cache/static and are listed in `degraded`.
pub fn open_blessing(raw_id: String) -> BlessingView {
    let service = match current_service() {
        Ok(service) => service,
        Err(message) => return BlessingView::failure("not_configured", message),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(message) => return BlessingView::failure("runtime_unavailable", message),
    };

    match runtime.block_on(service.open_session(raw_id.trim())) {
        Ok(session) => {
            let view = BlessingView::from_session(&session, "Blessing resolved.");
            *lock(&SESSION) = Some(session);
            view
        }
        Err(err) => {
            *lock(&SESSION) = None;
            BlessingView::from_error(&err)
        }
    }
}

/// Returns the active session view.
#[flutter_rust_bridge::frb(sync)]
pub fn current_blessing() -> BlessingView {
    match lock(&SESSION).as_ref() {
        Some(session) => BlessingView::from_session(session, "Current blessing."),
        None => BlessingView::no_session(),
    }
}

/// Checks `attempt` against the blessing's code.
///
/// # FFI contract
/// - Sync call, no I/O.
/// - A wrong code keeps the session locked and bumps `failed_attempts`.
#[flutter_rust_bridge::frb(sync)]
pub fn unlock_blessing(attempt: String) -> BlessingView {
    let mut guard = lock(&SESSION);
    let Some(session) = guard.as_mut() else {
        return BlessingView::no_session();
    };
    if session.try_unlock(&attempt) {
        BlessingView::from_session(session, "Unlocked.")
    } else {
        let mut view = BlessingView::from_session(session, "Wrong code.");
        view.ok = false;
        view.error_code = Some("wrong_password".to_string());
        view
    }
}

/// Saves the author's blessing for the active session.
///
/// `password` is optional; when protection is on without one, a 4-digit code
/// is drawn and returned in the response.
///
/// # FFI contract
/// - Async call (FRB worker thread); performs network and DB I/O.
/// - On failure the session is unchanged and `error_code` tells the UI
///   whether to offer a retry.
pub fn save_blessing(
    text: String,
    password_enabled: bool,
    password: Option<String>,
) -> SaveResponse {
    let service = match current_service() {
        Ok(service) => service,
        Err(message) => {
            return SaveResponse::failure(BlessingView::no_session(), "not_configured", message)
        }
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(message) => {
            return SaveResponse::failure(
                BlessingView::no_session(),
                "runtime_unavailable",
                message,
            )
        }
    };

    // Work on a copy so reader calls never wait on network I/O.
    let (mut working, draft) = {
        let guard = lock(&SESSION);
        let Some(session) = guard.as_ref() else {
            return SaveResponse::failure(
                BlessingView::no_session(),
                "no_session",
                "No blessing is open.",
            );
        };
        let Some(mut draft) = session.begin_edit() else {
            return SaveResponse::failure(
                BlessingView::from_session(session, "Unlock before editing."),
                "locked",
                "Unlock before editing.",
            );
        };
        draft.set_text(text);
        if let Some(password) = password.filter(|value| !value.trim().is_empty()) {
            draft.set_password(password.trim());
        }
        draft.set_password_enabled(password_enabled);
        (session.clone(), draft)
    };

    match runtime.block_on(service.save(&mut working, &draft)) {
        Ok(()) => {
            let view = BlessingView::from_session(&working, "Blessing saved.");
            let mut guard = lock(&SESSION);
            // A session opened or closed meanwhile is left alone.
            let still_active = guard
                .as_ref()
                .is_some_and(|current| current.session_id() == working.session_id());
            if still_active {
                *guard = Some(working);
            }
            SaveResponse {
                ok: true,
                view,
                password: draft.password().map(str::to_string),
                error_code: None,
                message: "Blessing saved.".to_string(),
            }
        }
        Err(err) => {
            warn!(
                "event=ffi_save module=ffi status=error code={} actionable={}",
                err.code(),
                err.is_user_actionable()
            );
            SaveResponse::failure(
                BlessingView::from_session(&working, "Blessing unchanged."),
                err.code(),
                err.to_string(),
            )
        }
    }
}

/// Re-locks the active session, as when the reader navigates away and back.
#[flutter_rust_bridge::frb(sync)]
pub fn reset_blessing() -> BlessingView {
    let mut guard = lock(&SESSION);
    let Some(session) = guard.as_mut() else {
        return BlessingView::no_session();
    };
    session.reset();
    BlessingView::from_session(session, "Session reset.")
}

/// Drops the active session.
#[flutter_rust_bridge::frb(sync)]
pub fn close_blessing() {
    *lock(&SESSION) = None;
}

fn build_service(
    remote_url: Option<String>,
    cache_db_path: Option<String>,
    backend: Option<String>,
) -> Result<Service, String> {
    let overrides = config_overrides(remote_url, cache_db_path, backend);
    let config = BlessingConfig::from_env_with(&overrides)
        .map_err(|err| format!("configure failed: {err}"))?;
    BlessingService::from_config(&config).map_err(|err| format!("configure failed: {err}"))
}

/// Caller-supplied settings that shadow their `BLESSING_*` variables.
fn config_overrides(
    remote_url: Option<String>,
    cache_db_path: Option<String>,
    backend: Option<String>,
) -> Vec<(&'static str, String)> {
    [
        (ENV_REMOTE_URL, remote_url),
        (ENV_CACHE_DB, cache_db_path),
        (ENV_BACKEND, backend),
    ]
    .into_iter()
    .filter_map(|(key, value)| non_blank(value).map(|value| (key, value)))
    .collect()
}

fn current_service() -> Result<Arc<Service>, String> {
    let mut guard = lock(&SERVICE);
    if let Some(service) = guard.as_ref() {
        return Ok(Arc::clone(service));
    }
    let service = Arc::new(build_service(None, None, None)?);
    *guard = Some(Arc::clone(&service));
    Ok(service)
}

fn runtime() -> Result<&'static Runtime, String> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let built = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("tokio runtime start failed: {err}"))?;
    // A concurrent caller may have won the race; its runtime is kept.
    let _ = RUNTIME.set(built);
    RUNTIME
        .get()
        .ok_or_else(|| "tokio runtime unavailable".to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{
        close_blessing, config_overrides, configure, core_version, current_blessing,
        init_logging, is_well_formed_id, open_blessing, ping, reset_blessing, save_blessing,
        unlock_blessing,
    };
    use blessing_core::{BlessingConfig, StoreBackend};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{mpsc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    // FFI state is process-global; tests touching it run one at a time.
    static FFI_STATE: Mutex<()> = Mutex::new(());

    fn configure_cache_only() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("cache.sqlite3");
        let error = configure(
            None,
            Some(db_path.to_string_lossy().into_owned()),
            Some("cache".to_string()),
        );
        assert!(error.is_empty(), "{error}");
        dir
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_bad_arguments() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
        assert!(!init_logging("verbose".to_string(), "/tmp/logs".to_string()).is_empty());
    }

    #[test]
    fn id_shape_check_is_exposed() {
        assert!(is_well_formed_id("A1B2C3D4".to_string()));
        assert!(!is_well_formed_id("ab".to_string()));
    }

    #[test]
    fn configure_rejects_unknown_backend() {
        let _state = FFI_STATE.lock().unwrap_or_else(|p| p.into_inner());
        let error = configure(None, None, Some("carrier-pigeon".to_string()));
        assert!(!error.is_empty());
    }

    #[test]
    fn malformed_id_fails_without_session() {
        let _state = FFI_STATE.lock().unwrap_or_else(|p| p.into_inner());
        let _dir = configure_cache_only();
        let view = open_blessing("ab".to_string());
        assert!(!view.ok);
        assert_eq!(view.error_code.as_deref(), Some("invalid_identifier"));
        assert_eq!(current_blessing().error_code.as_deref(), Some("no_session"));
    }

    #[test]
    fn protected_blessing_unlocks_and_relocks() {
        let _state = FFI_STATE.lock().unwrap_or_else(|p| p.into_inner());
        let _dir = configure_cache_only();

        let view = open_blessing("8F3K2M9Q".to_string());
        assert!(view.ok, "{}", view.message);
        assert_eq!(view.state, "blessing");
        assert!(view.locked);
        assert!(view.text.is_none());

        let wrong = unlock_blessing("0000".to_string());
        assert!(!wrong.ok);
        assert_eq!(wrong.failed_attempts, 1);

        let unlocked = unlock_blessing("2468".to_string());
        assert!(unlocked.ok);
        assert!(!unlocked.locked);
        assert!(unlocked.text.is_some());

        let reset = reset_blessing();
        assert!(reset.locked);
        close_blessing();
    }

    #[test]
    fn save_returns_synthesized_code_to_author() {
        let _state = FFI_STATE.lock().unwrap_or_else(|p| p.into_inner());
        let _dir = configure_cache_only();

        let view = open_blessing("5T8W2X6Y".to_string());
        assert_eq!(view.state, "no_blessing");
        assert!(!view.locked);

        let saved = save_blessing("Hello".to_string(), true, None);
        assert!(saved.ok, "{}", saved.message);
        let code = saved.password.expect("synthesized code");
        assert_eq!(code.len(), 4);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(saved.view.state, "blessing");
        assert_eq!(saved.view.text.as_deref(), Some("Hello"));

        let reopened = open_blessing("5T8W2X6Y".to_string());
        assert_eq!(reopened.source.as_deref(), Some("cache"));
        assert!(reopened.locked);
        assert!(unlock_blessing(code).ok);
        close_blessing();
    }

    #[test]
    fn save_rejects_empty_text_and_keeps_session() {
        let _state = FFI_STATE.lock().unwrap_or_else(|p| p.into_inner());
        let _dir = configure_cache_only();

        open_blessing("7H4N6P1R".to_string());
        let saved = save_blessing("   ".to_string(), false, None);
        assert!(!saved.ok);
        assert_eq!(saved.error_code.as_deref(), Some("validation_failed"));
        assert_eq!(saved.view.state, "no_blessing");
        close_blessing();
    }

    #[test]
    fn explicit_backend_shadows_environment() {
        let overrides = config_overrides(None, Some("  ".to_string()), Some(" cache ".to_string()));
        assert_eq!(overrides, vec![("BLESSING_BACKEND", "cache".to_string())]);

        let config = BlessingConfig::from_lookup_with(&overrides, |key| {
            (key == "BLESSING_BACKEND").then(|| "bogus".to_string())
        })
        .expect("override wins");
        assert_eq!(config.backend, StoreBackend::CacheOnly);
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("request line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).expect("request body");
        String::from_utf8(body).expect("utf-8 body")
    }

    fn respond(stream: &mut TcpStream, body: &str) {
        write!(
            stream,
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
        .expect("write response");
    }

    /// Remote that answers the fetch at once and holds the upsert until
    /// `release` fires. `in_flight` fires once the upsert has arrived.
    struct SlowRemote {
        url: String,
        in_flight: mpsc::Receiver<()>,
        release: mpsc::Sender<()>,
        server: thread::JoinHandle<()>,
    }

    fn slow_remote() -> SlowRemote {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/", listener.local_addr().expect("addr"));
        let (in_flight_tx, in_flight) = mpsc::channel();
        let (release, release_rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut fetch, _) = listener.accept().expect("fetch");
            read_request(&mut fetch);
            respond(&mut fetch, "[]");
            drop(fetch);

            let (mut upsert, _) = listener.accept().expect("upsert");
            let body = read_request(&mut upsert);
            in_flight_tx.send(()).expect("signal in flight");
            let _ = release_rx.recv_timeout(Duration::from_secs(10));
            respond(
                &mut upsert,
                &format!(r#"{{"status":"success","data":{body}}}"#),
            );
        });
        SlowRemote {
            url,
            in_flight,
            release,
            server,
        }
    }

    #[test]
    fn reader_calls_stay_responsive_during_a_slow_save() {
        let _state = FFI_STATE.lock().unwrap_or_else(|p| p.into_inner());
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = slow_remote();
        let error = configure(
            Some(remote.url.clone()),
            Some(dir.path().join("cache.sqlite3").to_string_lossy().into_owned()),
            Some("layered".to_string()),
        );
        assert!(error.is_empty(), "{error}");

        let view = open_blessing("5T8W2X6Y".to_string());
        assert!(view.ok, "{}", view.message);
        assert_eq!(view.state, "no_blessing");

        let saver = thread::spawn(|| save_blessing("Hello".to_string(), false, None));
        remote
            .in_flight
            .recv_timeout(Duration::from_secs(5))
            .expect("upsert reached the remote");

        let started = Instant::now();
        let during = current_blessing();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!saver.is_finished());
        assert!(during.ok);
        assert_eq!(during.state, "no_blessing");

        remote.release.send(()).expect("release upsert");
        let saved = saver.join().expect("save thread");
        assert!(saved.ok, "{}", saved.message);
        assert_eq!(current_blessing().text.as_deref(), Some("Hello"));

        remote.server.join().expect("remote thread");
        close_blessing();
    }
}
