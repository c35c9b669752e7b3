//! Kitchen subscription keys and the per-kitchen executor.
//!
//! Each kitchen operates in complete isolation with its own:
//! - Async execution task
//! - Transport connection
//! - Router instance (status, log trail, heartbeat)

mod executor;

pub use executor::{ExecutorControl, KitchenExecutor, KitchenHandle};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Kitchen used when none is configured.
pub const DEFAULT_KITCHEN: &str = "MainKitchen";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KitchenNameError {
    #[error("Kitchen name must not be empty")]
    Empty,
}

/// Subscription key identifying one order-fulfillment location.
///
/// The transport delivers order events under an event name equal to this
/// key, so it is compared verbatim (after trimming surrounding whitespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KitchenName(String);

impl KitchenName {
    /// Creates a kitchen name, rejecting empty or whitespace-only input.
    pub fn new(name: impl AsRef<str>) -> Result<Self, KitchenNameError> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(KitchenNameError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as sent to and received from the transport.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses a comma-separated list, skipping empty segments.
    pub fn parse_list(list: &str) -> Vec<KitchenName> {
        list.split(',')
            .filter_map(|part| KitchenName::new(part).ok())
            .collect()
    }
}

impl Default for KitchenName {
    fn default() -> Self {
        Self(DEFAULT_KITCHEN.to_string())
    }
}

impl FromStr for KitchenName {
    type Err = KitchenNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KitchenName::new(s)
    }
}

impl fmt::Display for KitchenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
