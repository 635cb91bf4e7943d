//! Broker configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid config.
//! Environment variables override loaded values:
//!
//! | variable | field |
//! |---|---|
//! | `BROKER_WAIT_TIMEOUT_MS` | `wait_timeout_ms` |
//! | `BROKER_THREAD_PREFIX` | `thread_name_prefix` |

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelLifetime;

pub const ENV_WAIT_TIMEOUT_MS: &str = "BROKER_WAIT_TIMEOUT_MS";
pub const ENV_THREAD_PREFIX: &str = "BROKER_THREAD_PREFIX";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid broker config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Bound on a scheduler thread's wait for work, in milliseconds.
    pub wait_timeout_ms: u64,
    /// Worker threads are named `<prefix>-<n>`.
    pub thread_name_prefix: String,
    /// Lifetime used by `Broker::commands` / `Broker::events`.
    pub default_lifetime: ChannelLifetime,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 2_000,
            thread_name_prefix: "broker".to_string(),
            default_lifetime: ChannelLifetime::Default,
        }
    }
}

impl BrokerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_WAIT_TIMEOUT_MS) {
            self.wait_timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_WAIT_TIMEOUT_MS,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_THREAD_PREFIX) {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidEnv {
                    key: ENV_THREAD_PREFIX,
                    value,
                });
            }
            self.thread_name_prefix = value;
        }
        Ok(self)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}
