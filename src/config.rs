// Configuration layer.
// Typed settings resolved with layered precedence: file, then environment, then CLI.

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::paths;

const LOCAL_CONFIG_BASENAME: &str = "ghcache";
const ENV_PREFIX: &str = "GHCACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3100;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15 * 60;

/// Command-line arguments for the ghcache binary.
#[derive(Debug, Parser)]
#[command(name = "ghcache", version, about = "GitHub data cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "GHCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the cache inspection and cleanup endpoints.
    Serve(Box<ServeArgs>),
    /// Print the live value stored under a key.
    Get(GetArgs),
    /// Store a value under a key.
    Set(SetArgs),
    /// Delete expired entries once and report how many were removed.
    Sweep(SweepArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct StoreOverride {
    /// Override the SQLite database path.
    #[arg(long = "store-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub store_path: Option<PathBuf>,

    /// Override how long to wait on a locked database, in milliseconds.
    #[arg(long = "store-busy-timeout-ms", value_name = "MILLIS")]
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub store: StoreOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the background sweep cadence (0 disables it).
    #[arg(long = "sweep-interval-seconds", value_name = "SECONDS")]
    pub sweep_interval_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    #[command(flatten)]
    pub store: StoreOverride,

    /// Cache key, as rendered by the key builder.
    #[arg(value_name = "KEY")]
    pub key: String,
}

#[derive(Debug, Args, Clone)]
pub struct SetArgs {
    #[command(flatten)]
    pub store: StoreOverride,

    /// Cache key, as rendered by the key builder.
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Opaque value to store.
    #[arg(value_name = "VALUE")]
    pub value: String,

    /// Seconds until the entry expires; omit to store without expiry.
    #[arg(long = "ttl-seconds", value_name = "SECONDS", allow_negative_numbers = true)]
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SweepArgs {
    #[command(flatten)]
    pub store: StoreOverride,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub sweep: SweepSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// `None` disables the background sweeper.
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Get(args)) => raw.apply_store_override(&args.store),
        Some(Command::Set(args)) => raw.apply_store_override(&args.store),
        Some(Command::Sweep(args)) => raw.apply_store_override(&args.store),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    store: RawStoreSettings,
    sweep: RawSweepSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    path: Option<PathBuf>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSweepSettings {
    interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_store_override(&overrides.store);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(secs) = overrides.sweep_interval_seconds {
            self.sweep.interval_seconds = Some(secs);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_store_override(&mut self, overrides: &StoreOverride) {
        if let Some(path) = overrides.store_path.as_ref() {
            self.store.path = Some(path.clone());
        }
        if let Some(ms) = overrides.busy_timeout_ms {
            self.store.busy_timeout_ms = Some(ms);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            store,
            sweep,
            logging,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            store: build_store_settings(store)?,
            sweep: build_sweep_settings(sweep),
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|err| LoadError::invalid("server.host", format!("`{host}`: {err}")))?;

    Ok(ServerSettings { addr })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let path = match store.path {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(LoadError::invalid("store.path", "path must not be empty"));
        }
        Some(path) => path,
        None => paths::database_path().ok_or_else(|| {
            LoadError::invalid(
                "store.path",
                "no platform cache directory is available; set it explicitly",
            )
        })?,
    };

    let busy_timeout_ms = store.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
    if busy_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "store.busy_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(StoreSettings {
        path,
        busy_timeout: Duration::from_millis(busy_timeout_ms),
    })
}

fn build_sweep_settings(sweep: RawSweepSettings) -> SweepSettings {
    let secs = sweep
        .interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    SweepSettings {
        interval: (secs > 0).then(|| Duration::from_secs(secs)),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_store() -> RawSettings {
        let mut raw = RawSettings::default();
        raw.store.path = Some(PathBuf::from("/tmp/ghcache-test.sqlite3"));
        raw
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = raw_with_store();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            store: StoreOverride {
                store_path: Some(PathBuf::from("/var/cache/ghcache.sqlite3")),
                ..Default::default()
            },
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(
            settings.store.path,
            PathBuf::from("/var/cache/ghcache.sqlite3")
        );
    }

    #[test]
    fn defaults_are_applied() {
        let settings = Settings::from_raw(raw_with_store()).expect("valid settings");
        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(
            settings.store.busy_timeout,
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)
        );
        assert_eq!(
            settings.sweep.interval,
            Some(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS))
        );
        assert!(matches!(settings.logging.format, LogFormat::Compact));
    }

    #[test]
    fn zero_sweep_interval_disables_sweeper() {
        let mut raw = raw_with_store();
        raw.apply_serve_overrides(&ServeOverrides {
            sweep_interval_seconds: Some(0),
            ..Default::default()
        });
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.sweep.interval, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut raw = raw_with_store();
        raw.server.port = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "server.port", .. })
        ));

        let mut raw = raw_with_store();
        raw.logging.level = Some("chatty".to_string());
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "logging.level", .. })
        ));

        let mut raw = raw_with_store();
        raw.store.busy_timeout_ms = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = raw_with_store();
        raw.apply_serve_overrides(&ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        });
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["ghcache"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_set_arguments() {
        let args = CliArgs::parse_from([
            "ghcache",
            "set",
            "--store-path",
            "/tmp/c.sqlite3",
            "--ttl-seconds",
            "-5",
            "issue-count:u:r",
            "12",
        ]);

        match args.command.expect("set command") {
            Command::Set(set) => {
                assert_eq!(set.key, "issue-count:u:r");
                assert_eq!(set.value, "12");
                assert_eq!(set.ttl_seconds, Some(-5));
                assert_eq!(set.store.store_path, Some(PathBuf::from("/tmp/c.sqlite3")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
