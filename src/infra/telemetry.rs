use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "listfeed_firehose_events_total",
            Unit::Count,
            "Total number of commit events pulled from the stream."
        );
        describe_counter!(
            "listfeed_firehose_ops_dropped_total",
            Unit::Count,
            "Total number of create operations dropped during classification, by reason."
        );
        describe_counter!(
            "listfeed_firehose_handler_errors_total",
            Unit::Count,
            "Total number of commits the downstream handler failed to persist."
        );
        describe_counter!(
            "listfeed_firehose_reconnects_total",
            Unit::Count,
            "Total number of subscription restarts."
        );
        describe_counter!(
            "listfeed_firehose_invalid_messages_total",
            Unit::Count,
            "Total number of stream messages skipped after failing validation."
        );
        describe_counter!(
            "listfeed_checkpoint_writes_total",
            Unit::Count,
            "Total number of persisted stream checkpoints."
        );
        describe_counter!(
            "listfeed_retention_deleted_total",
            Unit::Count,
            "Total number of posts removed by retention compaction."
        );
        describe_counter!(
            "listfeed_identity_cache_hit_total",
            Unit::Count,
            "Total number of identity cache hits."
        );
        describe_counter!(
            "listfeed_identity_cache_miss_total",
            Unit::Count,
            "Total number of identity cache misses."
        );
        describe_counter!(
            "listfeed_identity_cache_evict_total",
            Unit::Count,
            "Total number of identity cache entries evicted by count or age."
        );
        describe_histogram!(
            "listfeed_identity_resolve_ms",
            Unit::Milliseconds,
            "Identity resolution latency against the remote service in milliseconds."
        );
    });
}
