//! Strongly-typed configuration for the polling protocol.
//!
//! Values can be constructed from defaults, loaded from environment variables
//! (with optional `.env` support via `dotenvy`), or adjusted programmatically.
//! The configuration only carries ambient defaults — individual poll requests
//! still specify their own condition and deadline.

use std::env;
use std::num::ParseIntError;
use std::time::Duration;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use thiserror::Error;

use crate::condition::Condition;
use crate::poller::PollRequest;

const ENV_MAX_WAIT_SECS: &str = "REPOWATCH_MAX_WAIT_SECS";
const ENV_WAIT_HINT_MS: &str = "REPOWATCH_WAIT_HINT_MS";
const ENV_VERBOSE: &str = "REPOWATCH_VERBOSE";

/// Errors surfaced while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {variable}: {source}")]
    InvalidNumber {
        variable: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid verbosity '{value}'; expected 0, 1, or 2")]
    InvalidVerbosity { value: String },
}

/// Verbosity level for crate logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Ambient defaults threaded into poll requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepowatchConfig {
    pub verbose: Verbosity,
    /// Default wall-clock budget for a poll when the caller has no better
    /// estimate. Background accessioning regularly takes minutes.
    pub default_max_wait: Duration,
    /// Default query-local wait forwarded to session observations.
    pub default_wait_hint: Duration,
}

impl Default for RepowatchConfig {
    fn default() -> Self {
        Self {
            verbose: Verbosity::Medium,
            default_max_wait: Duration::from_secs(180),
            default_wait_hint: Duration::from_secs(1),
        }
    }
}

impl RepowatchConfig {
    /// Load configuration from the environment, honouring a `.env` file when
    /// present. Unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        let mut config = Self::default();

        if let Ok(value) = env::var(ENV_MAX_WAIT_SECS) {
            let secs: u64 = value.parse().map_err(|source| ConfigError::InvalidNumber {
                variable: ENV_MAX_WAIT_SECS,
                source,
            })?;
            config.default_max_wait = Duration::from_secs(secs);
        }

        if let Ok(value) = env::var(ENV_WAIT_HINT_MS) {
            let millis: u64 = value.parse().map_err(|source| ConfigError::InvalidNumber {
                variable: ENV_WAIT_HINT_MS,
                source,
            })?;
            config.default_wait_hint = Duration::from_millis(millis);
        }

        if let Ok(value) = env::var(ENV_VERBOSE) {
            let parsed: u8 = value.parse().map_err(|source| ConfigError::InvalidNumber {
                variable: ENV_VERBOSE,
                source,
            })?;
            config.verbose = Verbosity::from_u8(parsed)
                .ok_or(ConfigError::InvalidVerbosity { value })?;
        }

        Ok(config)
    }

    /// Build a poll request seeded with this configuration's defaults.
    pub fn poll_request(&self, success: Condition) -> PollRequest {
        PollRequest::new(success, self.default_max_wait).with_wait_hint(self.default_wait_hint)
    }
}
