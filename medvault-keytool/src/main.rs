//! Operator tool for the backend key pair.
//!
//! ```bash
//! medvault-keytool <init|rotate|show-public|schedule> [--key-dir <path>] [--config <file>]
//! ```
//!
//! - `init` loads the pair, generating and persisting one if none exists.
//! - `rotate` replaces the pair once.
//! - `show-public` prints the current public key PEM on stdout.
//! - `schedule` rotates daily at the configured UTC hour until Ctrl-C.
//!
//! Logs go to stderr and honour `RUST_LOG`.

use anyhow::{bail, Context, Result};
use medvault_keys::{KeyStore, KeyStoreConfig, RotationScheduler};
use medvault_policy::TracingAuditSink;
use medvault_records::CoreConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

const USAGE: &str =
    "Usage: medvault-keytool <init|rotate|show-public|schedule> [--key-dir <path>] [--config <file>]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Init,
    Rotate,
    ShowPublic,
    Schedule,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "init" => Some(Command::Init),
            "rotate" => Some(Command::Rotate),
            "show-public" => Some(Command::ShowPublic),
            "schedule" => Some(Command::Schedule),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    command: Command,
    key_dir: Option<PathBuf>,
    config: Option<PathBuf>,
}

/// `Ok(None)` means help was requested.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Args>> {
    let mut command = None;
    let mut key_dir = None;
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--key-dir" => {
                let value = args.next().filter(|v| !v.is_empty());
                key_dir = Some(PathBuf::from(value.context("--key-dir needs a path")?));
            }
            "--config" => {
                let value = args.next().filter(|v| !v.is_empty());
                config = Some(PathBuf::from(value.context("--config needs a file")?));
            }
            "-h" | "--help" => return Ok(None),
            other if command.is_none() => {
                let parsed = Command::parse(other);
                command = Some(parsed.with_context(|| format!("unknown command {other}"))?);
            }
            other => bail!("unexpected argument {other}"),
        }
    }

    let command = command.context("missing command")?;
    Ok(Some(Args {
        command,
        key_dir,
        config,
    }))
}

/// Config file first, then `--key-dir` on top.
fn key_store_config(args: &Args) -> Result<KeyStoreConfig> {
    let mut keys = match &args.config {
        Some(path) => CoreConfig::from_json_file(path)?.keys,
        None => KeyStoreConfig::default(),
    };
    if let Some(dir) = &args.key_dir {
        keys.key_dir = dir.clone();
    }
    keys.validate()?;
    Ok(keys)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(args: Args) -> Result<()> {
    let config = key_store_config(&args)?;
    // Opening may generate an RSA pair; keep it off the runtime workers.
    let opening = config.clone();
    let store = tokio::task::spawn_blocking(move || KeyStore::open(&opening))
        .await
        .context("key store task")?
        .with_context(|| format!("opening key store in {}", config.key_dir.display()))?;
    let store = Arc::new(store);

    match args.command {
        Command::Init => {
            let pair = store.current();
            info!(
                key_dir = %config.key_dir.display(),
                fingerprint = pair.fingerprint(),
                "backend key pair ready"
            );
        }
        Command::Rotate => {
            let previous = store.current();
            let rotating = Arc::clone(&store);
            let current = tokio::task::spawn_blocking(move || rotating.rotate())
                .await
                .context("rotation task")?
                .context("rotating backend key pair")?;
            info!(
                previous = previous.fingerprint(),
                current = current.fingerprint(),
                "rotated backend key pair"
            );
        }
        Command::ShowPublic => {
            print!("{}", store.public_key_pem());
        }
        Command::Schedule => {
            let (stop, shutdown) = watch::channel(false);
            let scheduler = RotationScheduler::new(
                store,
                config.rotation_hour_utc,
                Arc::new(TracingAuditSink),
            );
            let handle = scheduler.spawn(shutdown);
            info!(hour_utc = config.rotation_hour_utc, "rotation scheduler running");

            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("shutting down rotation scheduler");
            let _ = stop.send(true);
            handle.await.context("rotation scheduler task")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{USAGE}");
            return;
        }
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<Option<Args>> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_command_and_options_in_any_order() {
        let args = parse(&["--key-dir", "/tmp/keys", "rotate"]).unwrap().unwrap();
        assert_eq!(
            args,
            Args {
                command: Command::Rotate,
                key_dir: Some(PathBuf::from("/tmp/keys")),
                config: None,
            }
        );

        let args = parse(&["show-public", "--config", "core.json"]).unwrap().unwrap();
        assert_eq!(args.command, Command::ShowPublic);
        assert_eq!(args.config, Some(PathBuf::from("core.json")));
    }

    #[test]
    fn help_short_circuits() {
        assert!(parse(&["--help"]).unwrap().is_none());
        assert!(parse(&["init", "-h"]).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["encrypt"]).is_err());
        assert!(parse(&["init", "rotate"]).is_err());
        assert!(parse(&["init", "--key-dir"]).is_err());
        assert!(parse(&["init", "--config", ""]).is_err());
    }

    #[test]
    fn key_dir_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("core.json");
        let contents = r#"{ "keys": { "key_dir": "/srv/keys", "rotation_hour_utc": 5 } }"#;
        std::fs::write(&config, contents).unwrap();

        let config = config.to_str().unwrap();
        let args = parse(&["init", "--config", config, "--key-dir", "/opt/keys"])
            .unwrap()
            .unwrap();
        let keys = key_store_config(&args).unwrap();
        assert_eq!(keys.key_dir, PathBuf::from("/opt/keys"));
        assert_eq!(keys.rotation_hour_utc, 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn init_then_rotate_on_a_single_worker() {
        let dir = tempfile::tempdir().unwrap();
        let key_dir = dir.path().join("keys");
        let args = |command| Args {
            command,
            key_dir: Some(key_dir.clone()),
            config: None,
        };

        run(args(Command::Init)).await.unwrap();
        let config = KeyStoreConfig::with_key_dir(&key_dir);
        let first = std::fs::read_to_string(config.public_key_path()).unwrap();

        run(args(Command::Rotate)).await.unwrap();
        let second = std::fs::read_to_string(config.public_key_path()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn defaults_without_config() {
        let args = parse(&["init"]).unwrap().unwrap();
        assert_eq!(key_store_config(&args).unwrap(), KeyStoreConfig::default());
    }
}
