use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PROJECT: &str = "FEAST_PROJECT";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "FEAST_REQUEST_TIMEOUT_MS";
pub const ENV_FULL_FEATURE_NAMES: &str = "FEAST_FULL_FEATURE_NAMES";
pub const ENV_TABLE_FAILURE_POLICY: &str = "FEAST_TABLE_FAILURE_POLICY";

/// What a request does when the store read for one of its tables fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFailurePolicy {
    /// Fail the whole request.
    #[default]
    FailFast,
    /// Report every feature of the failed table as NOT_FOUND and carry on.
    Degrade,
}

impl FromStr for TableFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" => Ok(TableFailurePolicy::FailFast),
            "degrade" => Ok(TableFailurePolicy::Degrade),
            _ => Err(ConfigError::Invalid {
                var: ENV_TABLE_FAILURE_POLICY,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServingConfig {
    /// Project used when a request does not name one.
    pub default_project: String,
    /// Deadline for all store reads of one request; `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Field naming for the row-oriented call, which carries no flag of its own.
    pub full_feature_names: bool,
    pub table_failure_policy: TableFailurePolicy,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            default_project: "default".into(),
            request_timeout: Some(Duration::from_secs(5)),
            full_feature_names: false,
            table_failure_policy: TableFailurePolicy::FailFast,
        }
    }
}

impl ServingConfig {
    /// Defaults overridden by `FEAST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ServingConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(project) = lookup(ENV_PROJECT).filter(|p| !p.trim().is_empty()) {
            config.default_project = project.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: ENV_REQUEST_TIMEOUT_MS,
                value: raw.clone(),
            })?;
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(raw) = lookup(ENV_FULL_FEATURE_NAMES) {
            config.full_feature_names = parse_bool(&raw).ok_or(ConfigError::Invalid {
                var: ENV_FULL_FEATURE_NAMES,
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup(ENV_TABLE_FAILURE_POLICY) {
            config.table_failure_policy = raw.parse()?;
        }
        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
