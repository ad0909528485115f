use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::sums::{
    METRIC_SUM_CACHE_HIT, METRIC_SUM_CACHE_MISS, METRIC_SUM_INSERT_RACE, METRIC_SUM_RESOLVE_MS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Events go to stderr so command output on stdout stays machine-readable.
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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

/// Register metric descriptions with whichever recorder is installed.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_SUM_CACHE_HIT,
            Unit::Count,
            "Sum requests answered from a stored record."
        );
        describe_counter!(
            METRIC_SUM_CACHE_MISS,
            Unit::Count,
            "Sum requests that computed and stored a new record."
        );
        describe_counter!(
            METRIC_SUM_INSERT_RACE,
            Unit::Count,
            "Inserts rejected because a concurrent request stored the same key first."
        );
        describe_histogram!(
            METRIC_SUM_RESOLVE_MS,
            Unit::Milliseconds,
            "End-to-end sum resolution latency in milliseconds."
        );
    });
}
