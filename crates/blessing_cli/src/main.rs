//! Operator CLI for the blessing core.
//!
//! # Responsibility
//! - Resolve, write and unlock blessings against a configured backend.
//! - Keep output deterministic: one text line per fact, or one JSON document
//!   with `--json`.

use blessing_core::{
    default_log_level, init_logging, init_logging_from_env, is_well_formed, BlessingConfig,
    BlessingError, BlessingService, BlessingSession, Resolution, ResolveOutcome, StoreBackend,
    WriteRequest,
};
use blessing_core::config::{ENV_BACKEND, ENV_CACHE_DB, ENV_REMOTE_URL};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "blessing",
    version,
    about = "Resolve and write NFC tag blessings",
    arg_required_else_help = true
)]
struct Cli {
    /// Machine-readable JSON output.
    #[arg(long, global = true)]
    json: bool,

    /// Remote record store URL (overrides BLESSING_REMOTE_URL).
    #[arg(long, global = true, value_name = "URL")]
    remote_url: Option<String>,

    /// Local cache database (overrides BLESSING_CACHE_DB).
    #[arg(long, global = true, value_name = "PATH")]
    cache_db: Option<PathBuf>,

    /// Store backend: layered, remote or cache (overrides BLESSING_BACKEND).
    #[arg(long, global = true, value_name = "BACKEND")]
    backend: Option<StoreBackend>,

    /// Absolute directory for rolling log files (overrides BLESSING_LOG_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print core linkage info.
    Ping,

    /// Check a tag code's shape without touching any store.
    Validate { id: String },

    /// Resolve a tag code across remote, cache and static data.
    Resolve(ResolveArgs),

    /// Write a blessing for a tag code.
    Write(WriteArgs),

    /// Check an unlock code against a protected blessing.
    Unlock { id: String, code: String },
}

#[derive(Args, Debug)]
struct ResolveArgs {
    id: String,

    /// Treat ids absent from every source as an error.
    #[arg(long)]
    require_known: bool,
}

#[derive(Args, Debug)]
struct WriteArgs {
    id: String,
    text: String,

    /// Protect the blessing with a 4-digit code.
    #[arg(long)]
    password_enabled: bool,

    /// Explicit code; drawn at random when protection is on and this is unset.
    #[arg(long, value_name = "CODE", requires = "password_enabled")]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli).await {
        Ok(output) => {
            print_output(&cli, &output);
            ExitCode::SUCCESS
        }
        Err(failure) => {
            if cli.json {
                println!("{}", json!({ "ok": false, "code": failure.code, "message": failure.message }));
            } else {
                eprintln!("error[{}]: {}", failure.code, failure.message);
            }
            ExitCode::FAILURE
        }
    }
}

struct Failure {
    code: &'static str,
    message: String,
}

impl From<BlessingError> for Failure {
    fn from(err: BlessingError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl Failure {
    fn setup(message: impl Into<String>) -> Self {
        Self {
            code: "setup_failed",
            message: message.into(),
        }
    }
}

struct Output {
    lines: Vec<String>,
    document: Value,
}

async fn run(cli: &Cli) -> Result<Output, Failure> {
    start_logging(cli)?;

    match &cli.command {
        Command::Ping => Ok(Output {
            lines: vec![
                format!("blessing_core ping={}", blessing_core::ping()),
                format!("blessing_core version={}", blessing_core::core_version()),
            ],
            document: json!({
                "ping": blessing_core::ping(),
                "version": blessing_core::core_version(),
            }),
        }),
        Command::Validate { id } => {
            let well_formed = is_well_formed(id);
            if !well_formed {
                return Err(BlessingError::InvalidIdentifier(id.clone()).into());
            }
            Ok(Output {
                lines: vec![format!("id={id} well_formed=true")],
                document: json!({ "id": id, "well_formed": true }),
            })
        }
        Command::Resolve(args) => {
            let service = build_service(cli)?;
            let mut resolution = service.resolve(&args.id).await?;
            if args.require_known {
                resolution = resolution.ensure_known()?;
            }
            Ok(resolution_output(&resolution))
        }
        Command::Write(args) => {
            let service = build_service(cli)?;
            let ack = service
                .write(WriteRequest {
                    id: args.id.clone(),
                    text: args.text.clone(),
                    password_enabled: args.password_enabled,
                    password: args.password.clone(),
                })
                .await?;
            let mut lines = vec![
                format!("id={} written=true stored_in={}", ack.id, ack.stored_in.as_str()),
                format!("password_enabled={}", ack.record.password_enabled),
            ];
            if let Some(code) = ack.record.password.as_deref() {
                lines.push(format!("password={code}"));
            }
            Ok(Output {
                lines,
                document: json!({
                    "id": ack.id.as_str(),
                    "stored_in": ack.stored_in,
                    "record": ack.record,
                }),
            })
        }
        Command::Unlock { id, code } => {
            let service = build_service(cli)?;
            let mut session: BlessingSession = service.open_session(id).await?;
            let unlocked = session.try_unlock(code);
            if !unlocked {
                return Err(Failure {
                    code: "wrong_password",
                    message: format!("code does not unlock `{id}`"),
                });
            }
            let text = session.visible_text().map(str::to_string);
            let mut lines = vec![format!("id={id} unlocked=true")];
            if let Some(text) = &text {
                lines.push(format!("text={text}"));
            }
            Ok(Output {
                lines,
                document: json!({ "id": id, "unlocked": true, "text": text }),
            })
        }
    }
}

fn start_logging(cli: &Cli) -> Result<(), Failure> {
    match cli.log_dir.as_deref() {
        Some(dir) => init_logging(default_log_level(), dir),
        None => init_logging_from_env().map(|_| ()),
    }
    .map_err(|err| Failure::setup(err.to_string()))
}

fn build_service(
    cli: &Cli,
) -> Result<BlessingService<blessing_core::HttpRemoteStore, blessing_core::SqliteCacheStore>, Failure>
{
    let config = BlessingConfig::from_env_with(&config_overrides(cli))
        .map_err(|err| Failure::setup(err.to_string()))?;
    BlessingService::from_config(&config).map_err(|err| Failure::setup(err.to_string()))
}

/// Flags that replace their environment variables before validation.
fn config_overrides(cli: &Cli) -> Vec<(&'static str, String)> {
    let mut overrides = Vec::new();
    if let Some(url) = &cli.remote_url {
        overrides.push((ENV_REMOTE_URL, url.clone()));
    }
    if let Some(path) = &cli.cache_db {
        overrides.push((ENV_CACHE_DB, path.to_string_lossy().into_owned()));
    }
    if let Some(backend) = cli.backend {
        overrides.push((ENV_BACKEND, backend.as_str().to_string()));
    }
    overrides
}

fn resolution_output(resolution: &Resolution) -> Output {
    let state = match &resolution.outcome {
        ResolveOutcome::Blessing(_) => "blessing",
        ResolveOutcome::NoBlessing(_) => "no_blessing",
        ResolveOutcome::Unknown => "unknown",
    };
    let degraded: Vec<&str> = resolution.degraded.iter().map(BlessingError::code).collect();
    let protected = resolution
        .record()
        .is_some_and(|record| record.requires_password());

    let mut lines = vec![format!(
        "id={} state={} source={} protected={}",
        resolution.id,
        state,
        resolution.source.as_str(),
        protected
    )];
    if !degraded.is_empty() {
        lines.push(format!("degraded={}", degraded.join(",")));
    }
    // Protected text stays hidden; `unlock` reveals it.
    let text = resolution
        .record()
        .filter(|record| !record.requires_password())
        .and_then(|record| record.blessing_text());
    if let Some(text) = text {
        lines.push(format!("text={text}"));
    }

    Output {
        lines,
        document: json!({
            "id": resolution.id.as_str(),
            "state": state,
            "source": resolution.source,
            "protected": protected,
            "text": text,
            "degraded": degraded,
        }),
    }
}

fn print_output(cli: &Cli, output: &Output) {
    if cli.json {
        println!("{}", output.document);
    } else {
        for line in &output.lines {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{config_overrides, Cli, Command};
    use blessing_core::{BlessingConfig, StoreBackend};
    use clap::Parser;

    #[test]
    fn parses_global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "blessing",
            "resolve",
            "A1B2C3D4",
            "--backend",
            "cache",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.backend, Some(StoreBackend::CacheOnly));
        assert!(matches!(cli.command, Command::Resolve(ref args) if args.id == "A1B2C3D4"));
    }

    #[test]
    fn password_requires_protection_flag() {
        let err = Cli::try_parse_from(["blessing", "write", "A1B2C3D4", "hi", "--password", "1234"]);
        assert!(err.is_err());

        let cli = Cli::try_parse_from([
            "blessing",
            "write",
            "A1B2C3D4",
            "hi",
            "--password-enabled",
            "--password",
            "1234",
        ])
        .unwrap();
        match cli.command {
            Command::Write(args) => {
                assert!(args.password_enabled);
                assert_eq!(args.password.as_deref(), Some("1234"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        assert!(Cli::try_parse_from(["blessing", "--backend", "pigeon", "ping"]).is_err());
    }

    #[test]
    fn backend_flag_replaces_environment_value() {
        let cli = Cli::try_parse_from(["blessing", "--backend", "cache", "ping"]).unwrap();
        let overrides = config_overrides(&cli);
        let config = BlessingConfig::from_lookup_with(&overrides, |key| {
            (key == "BLESSING_BACKEND").then(|| "bogus".to_string())
        })
        .unwrap();
        assert_eq!(config.backend, StoreBackend::CacheOnly);
    }
}
