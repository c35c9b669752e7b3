//! Telemetry and structured logging setup.
//!
//! Provides consistent logging across all components with:
//! - Kitchen-tagged log lines for filtering
//! - Structured JSON output for log aggregation
//! - Configurable verbosity via RUST_LOG

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogFormat;

/// Filter used when RUST_LOG is not set.
const DEFAULT_FILTER: &str = "info,kitchen_notify=debug";

/// Initializes the telemetry/logging system.
///
/// Example RUST_LOG values:
/// - `info` - All info and above
/// - `kitchen_notify=debug` - Debug for our crate, default for others
/// - `kitchen_notify=trace,tokio_tungstenite=warn` - Trace for us, quiet transport
pub fn init_telemetry(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
            .init(),
    }
}
