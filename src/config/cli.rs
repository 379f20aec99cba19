use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the listfeed binary.
#[derive(Debug, Parser)]
#[command(
    name = "listfeed",
    version,
    about = "Firehose ingestion and identity resolution for list feeds"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "LISTFEED_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Consume the repository event stream and index posts by list members.
    Ingest(Box<IngestArgs>),
    /// Resolve a handle to its DID, or a DID to its handle.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub overrides: IngestOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
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

#[derive(Debug, Args, Default, Clone)]
pub struct IngestOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the relay subscription endpoint.
    #[arg(long = "firehose-endpoint", value_name = "URL", value_hint = ValueHint::Url)]
    pub firehose_endpoint: Option<String>,

    /// Override the name the checkpoint is stored under.
    #[arg(long = "firehose-service", value_name = "NAME")]
    pub firehose_service: Option<String>,

    /// Override the delay between reconnect attempts.
    #[arg(long = "firehose-reconnect-delay-ms", value_name = "MILLIS")]
    pub firehose_reconnect_delay_ms: Option<u64>,

    /// Override how long indexed posts are retained.
    #[arg(long = "retention-retain-hours", value_name = "HOURS")]
    pub retention_retain_hours: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub target: ResolveTarget,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the identity service base URL.
    #[arg(long = "identity-service-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub identity_service_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
#[group(required = true, multiple = false)]
pub struct ResolveTarget {
    /// Handle to resolve to a DID.
    #[arg(long, value_name = "HANDLE")]
    pub handle: Option<String>,

    /// DID to resolve to a handle.
    #[arg(long, value_name = "DID")]
    pub did: Option<String>,
}
