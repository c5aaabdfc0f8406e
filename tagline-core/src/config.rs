use std::env;
use std::time::Duration;

use crate::errors::ConfigError;

/// Default period of the recurring low-frequency poll, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Settings shared by the runtime facade and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub environment: Environment,
    pub poll_interval: Duration,
    pub log_level: String,
    pub force_lower_case: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            log_level: "info".to_string(),
            force_lower_case: false,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from the process environment (`TAGLINE_*`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("TAGLINE_")
    }

    /// Loads configuration from env vars prefixed with the provided value.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let poll_key = key("POLL_INTERVAL_MS");
        let poll_interval = match env::var(&poll_key) {
            Ok(raw) => Duration::from_millis(parse_millis(&poll_key, &raw)?),
            Err(_) => Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        };

        let log_level = env::var(key("LOG")).unwrap_or_else(|_| "info".to_string());

        let lower_key = key("FORCE_LOWER_CASE");
        let force_lower_case = match env::var(&lower_key) {
            Ok(raw) => parse_flag(&lower_key, &raw)?,
            Err(_) => false,
        };

        Ok(Self {
            environment,
            poll_interval,
            log_level,
            force_lower_case,
        })
    }

    /// Whether the runtime is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, ConfigError> {
    let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: "expected a whole number of milliseconds".into(),
    })?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "poll interval must be positive".into(),
        });
    }
    Ok(millis)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
