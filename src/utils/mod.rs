//! Shared utilities.

mod telemetry;

pub use telemetry::init_telemetry;
