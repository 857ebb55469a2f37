//! Logging setup using tracing.
//!
//! JSON output suits log aggregation when runs are scheduled; text output is
//! for interactive use. Logs go to stderr so command output stays parseable.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CliError, CliResult};

/// Environment variable overriding the configured log filter.
pub const LOG_ENV: &str = "SYNCBRIDGE_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

/// Build the filter from `SYNCBRIDGE_LOG`, falling back to `filter`.
pub fn build_filter(filter: &str) -> CliResult<EnvFilter> {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| CliError::Config(format!("invalid log filter '{filter}': {e}")))
}

/// Initialize the tracing subscriber.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_logging(filter: &str, format: LogFormat) -> CliResult<()> {
    let filter_layer = build_filter(filter)?;

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .flatten_event(true),
            )
            .with(filter_layer)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter_layer)
            .try_init(),
    };
    if result.is_ok() {
        tracing::debug!(filter = %filter, format = ?format, "Logging initialized");
    }
    Ok(())
}

/// Initialize logging for tests (with simpler output).
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
