//! Planner configuration
//!
//! Configuration loaded from environment variables and command line.

use std::time::Duration;

use clap::ValueEnum;
use cyxcloud_solver::SearchLimits;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Planner configuration
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Branching decisions allowed per solve call
    pub max_branches: u64,

    /// Wall-clock budget per solve call in milliseconds
    pub time_limit_ms: Option<u64>,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_branches: SearchLimits::default().max_branches,
            time_limit_ms: None,
            log_format: LogFormat::Text,
        }
    }
}

impl PlannerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_branches = match lookup("PLACEMENT_MAX_BRANCHES") {
            Some(v) => parse_value("PLACEMENT_MAX_BRANCHES", &v)?,
            None => defaults.max_branches,
        };

        let time_limit_ms = match lookup("PLACEMENT_TIME_LIMIT_MS") {
            Some(v) => Some(parse_value("PLACEMENT_TIME_LIMIT_MS", &v)?),
            None => defaults.time_limit_ms,
        };

        let log_format = match lookup("PLACEMENT_LOG_FORMAT") {
            Some(v) => LogFormat::from_str(&v, true).map_err(|_| {
                ConfigError::InvalidValue("PLACEMENT_LOG_FORMAT".to_string(), v.clone())
            })?,
            None => defaults.log_format,
        };

        Ok(Self {
            max_branches,
            time_limit_ms,
            log_format,
        })
    }

    /// Get the per-solve time limit as Duration
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    /// Search limits for the built-in engine
    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            max_branches: self.max_branches,
            time_limit: self.time_limit(),
        }
    }
}

fn parse_value(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PlannerConfig::default();
        assert_eq!(config.max_branches, 5_000_000);
        assert!(config.time_limit().is_none());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_from_lookup() {
        let config = PlannerConfig::from_lookup(lookup(&[
            ("PLACEMENT_MAX_BRANCHES", "1000"),
            ("PLACEMENT_TIME_LIMIT_MS", "250"),
            ("PLACEMENT_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.max_branches, 1000);
        assert_eq!(config.time_limit(), Some(Duration::from_millis(250)));
        assert_eq!(config.log_format, LogFormat::Json);

        let limits = config.search_limits();
        assert_eq!(limits.max_branches, 1000);
        assert_eq!(limits.time_limit, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_value() {
        let err = PlannerConfig::from_lookup(lookup(&[("PLACEMENT_MAX_BRANCHES", "lots")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for PLACEMENT_MAX_BRANCHES: lots"
        );

        assert!(
            PlannerConfig::from_lookup(lookup(&[("PLACEMENT_LOG_FORMAT", "xml")])).is_err()
        );
    }
}
