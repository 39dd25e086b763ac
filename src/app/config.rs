use crate::services::checkout_session::PollPolicy;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub checkout_url: String,
    pub poll_interval_ms: u64,
    pub max_poll_wait_secs: Option<u64>,
    pub request_timeout_ms: u64,
    pub default_currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            checkout_url: "http://localhost:3001".to_string(),
            poll_interval_ms: 2000,
            max_poll_wait_secs: None,
            request_timeout_ms: 5000,
            default_currency: "INR".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_base_url: env::var("GATEWAY_API_BASE_URL")
                .unwrap_or(defaults.api_base_url),
            checkout_url: env::var("GATEWAY_CHECKOUT_URL")
                .unwrap_or(defaults.checkout_url),
            poll_interval_ms: env::var("GATEWAY_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_interval_ms),
            max_poll_wait_secs: env::var("GATEWAY_MAX_POLL_WAIT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(defaults.max_poll_wait_secs),
            request_timeout_ms: env::var("GATEWAY_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_ms),
            default_currency: env::var("GATEWAY_DEFAULT_CURRENCY")
                .unwrap_or(defaults.default_currency),
        }
    }

    /// Loads a TOML file; keys left out take the same defaults as `from_env`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("api_base_url", &self.api_base_url), ("checkout_url", &self.checkout_url)] {
            url::Url::parse(value).map_err(|e| ConfigError::Invalid {
                field,
                reason: e.to_string(),
            })?;
        }
        let nonzero = [
            ("poll_interval_ms", Some(self.poll_interval_ms)),
            ("request_timeout_ms", Some(self.request_timeout_ms)),
            ("max_poll_wait_secs", self.max_poll_wait_secs),
        ];
        for (field, value) in nonzero {
            if value == Some(0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.default_currency.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_currency",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: self.max_poll_wait_secs.map(Duration::from_secs),
        }
    }
}
