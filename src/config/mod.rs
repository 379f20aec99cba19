//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CliArgs, Command, IngestArgs, IngestOverrides, LoggingOverrides, ResolveArgs, ResolveTarget,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "listfeed";
const ENV_PREFIX: &str = "LISTFEED";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_FIREHOSE_ENDPOINT: &str = "wss://bsky.network";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
const DEFAULT_RETAIN_HOURS: u32 = 48;
const DEFAULT_IDENTITY_SERVICE_URL: &str = "https://public.api.bsky.app";
const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 5 * 60 * 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub firehose: FirehoseSettings,
    pub retention: RetentionSettings,
    pub identity: IdentitySettings,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct FirehoseSettings {
    pub endpoint: Url,
    /// Key of the checkpoint row; distinct relays keep distinct cursors.
    pub service: String,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub retain_hours: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub service_url: Url,
    pub cache_enabled: bool,
    pub cache_max_entries: NonZeroUsize,
    pub cache_ttl: Duration,
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
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Ingest(args)) => raw.apply_ingest_overrides(&args.overrides),
        Some(Command::Resolve(args)) => raw.apply_resolve_overrides(args),
        None => raw.apply_ingest_overrides(&IngestOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    firehose: RawFirehoseSettings,
    retention: RawRetentionSettings,
    identity: RawIdentitySettings,
}

impl RawSettings {
    fn apply_ingest_overrides(&mut self, overrides: &IngestOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(endpoint) = overrides.firehose_endpoint.as_ref() {
            self.firehose.endpoint = Some(endpoint.clone());
        }
        if let Some(service) = overrides.firehose_service.as_ref() {
            self.firehose.service = Some(service.clone());
        }
        if let Some(delay) = overrides.firehose_reconnect_delay_ms {
            self.firehose.reconnect_delay_ms = Some(delay);
        }
        if let Some(hours) = overrides.retention_retain_hours {
            self.retention.retain_hours = Some(hours);
        }
    }

    fn apply_resolve_overrides(&mut self, args: &ResolveArgs) {
        self.apply_logging_overrides(&args.logging);
        if let Some(url) = args.identity_service_url.as_ref() {
            self.identity.service_url = Some(url.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            firehose,
            retention,
            identity,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let firehose = build_firehose_settings(firehose)?;
        let retention = build_retention_settings(retention)?;
        let identity = build_identity_settings(identity)?;

        Ok(Self {
            logging,
            database,
            firehose,
            retention,
            identity,
        })
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_connections.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_firehose_settings(firehose: RawFirehoseSettings) -> Result<FirehoseSettings, LoadError> {
    let endpoint =
        non_blank(firehose.endpoint).unwrap_or_else(|| DEFAULT_FIREHOSE_ENDPOINT.into());
    let endpoint = parse_url(&endpoint, "firehose.endpoint", &["ws", "wss"])?;

    let service = non_blank(firehose.service)
        .unwrap_or_else(|| endpoint.as_str().trim_end_matches('/').to_string());

    let delay_ms = firehose
        .reconnect_delay_ms
        .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
    if delay_ms == 0 {
        return Err(LoadError::invalid(
            "firehose.reconnect_delay_ms",
            "must be greater than zero",
        ));
    }

    Ok(FirehoseSettings {
        endpoint,
        service,
        reconnect_delay: Duration::from_millis(delay_ms),
    })
}

fn build_retention_settings(
    retention: RawRetentionSettings,
) -> Result<RetentionSettings, LoadError> {
    let hours = retention.retain_hours.unwrap_or(DEFAULT_RETAIN_HOURS);
    let retain_hours = non_zero_u32(hours.into(), "retention.retain_hours")?;
    Ok(RetentionSettings { retain_hours })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let service_url =
        non_blank(identity.service_url).unwrap_or_else(|| DEFAULT_IDENTITY_SERVICE_URL.into());
    let service_url = parse_url(&service_url, "identity.service_url", &["http", "https"])?;

    let max_entries = identity
        .cache_max_entries
        .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
    let cache_max_entries = NonZeroUsize::new(max_entries).ok_or_else(|| {
        LoadError::invalid("identity.cache_max_entries", "must be greater than zero")
    })?;

    let ttl_seconds = identity
        .cache_ttl_seconds
        .unwrap_or(DEFAULT_CACHE_TTL_SECONDS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "identity.cache_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(IdentitySettings {
        service_url,
        cache_enabled: identity.cache_enabled.unwrap_or(true),
        cache_max_entries,
        cache_ttl: Duration::from_secs(ttl_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFirehoseSettings {
    endpoint: Option<String>,
    service: Option<String>,
    reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetentionSettings {
    retain_hours: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    service_url: Option<String>,
    cache_enabled: Option<bool>,
    cache_max_entries: Option<usize>,
    cache_ttl_seconds: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_url(value: &str, key: &'static str, schemes: &[&str]) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(LoadError::invalid(
            key,
            format!("scheme must be one of {}", schemes.join(", ")),
        ));
    }
    Ok(url)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
