//! Runtime configuration, read from the environment.
//!
//! `main` loads a `.env` file (if present) before calling
//! [`NotifierConfig::from_env`]. Every value has a default; a value that
//! fails to parse is reported and replaced by its default.

use std::time::Duration;

use tracing::warn;

use crate::kitchens::KitchenName;
use crate::router::DEFAULT_HEARTBEAT_INTERVAL;

/// Default notification server endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3001";

/// Transport connection and retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Retries after a lost or failed connection; `None` retries forever.
    pub reconnection_attempts: Option<u32>,
    /// Backoff before the first retry; doubles per failed retry.
    pub reconnection_delay: Duration,
    /// Upper bound on the backoff.
    pub reconnection_delay_max: Duration,
    /// Per-attempt connection timeout.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnection_attempts: Some(10),
            reconnection_delay: Duration::from_millis(1000),
            reconnection_delay_max: Duration::from_millis(2000),
            connect_timeout: Duration::from_millis(5000),
        }
    }
}

impl TransportConfig {
    /// Backoff to wait before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnection_delay
            .saturating_mul(factor)
            .min(self.reconnection_delay_max)
    }

    /// Returns true once `attempt` retries have been used up.
    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        self.reconnection_attempts.is_some_and(|max| attempt > max)
    }
}

/// Log output format for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Reads `LOG_FORMAT`. Used before telemetry (and the rest of the
    /// configuration) is initialized.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(raw) if raw.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Top-level configuration for the notifier binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub server_url: String,
    pub kitchens: Vec<KitchenName>,
    pub heartbeat_interval: Duration,
    pub transport: TransportConfig,
    pub log_format: LogFormat,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            kitchens: vec![KitchenName::default()],
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            transport: TransportConfig::default(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl NotifierConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let server_url = lookup("NOTIFICATION_SERVER_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(defaults.server_url);

        let kitchens = match lookup("KITCHEN_NAMES") {
            Some(list) => {
                let parsed = KitchenName::parse_list(&list);
                if parsed.is_empty() {
                    warn!("KITCHEN_NAMES is empty, using {}", KitchenName::default());
                    defaults.kitchens
                } else {
                    parsed
                }
            }
            None => defaults.kitchens,
        };

        let heartbeat_interval = parse_or(&lookup, "HEARTBEAT_INTERVAL_SECS", 30u64).max(1);

        let reconnection_attempts = match lookup("RECONNECTION_ATTEMPTS") {
            Some(raw) if raw.trim().eq_ignore_ascii_case("infinite") => None,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => {
                    warn!("Invalid RECONNECTION_ATTEMPTS '{}', using default", raw);
                    defaults.transport.reconnection_attempts
                }
            },
            None => defaults.transport.reconnection_attempts,
        };

        let transport = TransportConfig {
            reconnection_attempts,
            reconnection_delay: Duration::from_millis(parse_or(
                &lookup,
                "RECONNECTION_DELAY_MS",
                1000,
            )),
            reconnection_delay_max: Duration::from_millis(parse_or(
                &lookup,
                "RECONNECTION_DELAY_MAX_MS",
                2000,
            )),
            connect_timeout: Duration::from_millis(parse_or(&lookup, "CONNECT_TIMEOUT_MS", 5000)),
        };

        let log_format = LogFormat::parse(lookup("LOG_FORMAT").as_deref());

        Self {
            server_url,
            kitchens,
            heartbeat_interval: Duration::from_secs(heartbeat_interval),
            transport,
            log_format,
        }
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {} '{}', using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}
