use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{ExecutionLimits, LimitsError, LimitsOverride, SecurityLevel};

mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../chartbox.example.toml");

/// Prefix for environment variable overrides (`CHARTBOX_SECURITY_LEVEL`, ...)
pub const ENV_PREFIX: &str = "CHARTBOX";

/// Longest accepted grace period after a deadline fires
const MAX_GRACE_PERIOD_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid limits: {0}")]
    Limits(#[from] LimitsError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for chartbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Policy used when a request does not pick one
    #[serde(default)]
    pub security_level: SecurityLevel,

    /// Default resource limits applied to every invocation.
    /// Per-request overrides take precedence.
    #[serde(default)]
    pub limits: ExecutionLimits,

    /// Directory under which per-invocation scratch directories are created
    /// (system temp dir if not specified).
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Directory that accepted artifacts are copied into before the scratch
    /// directory is removed. Nothing is exported if not specified.
    #[serde(default)]
    pub export_dir: Option<PathBuf>,

    /// How long to wait for the worker to stop after the deadline fires
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Config {
    /// Create a config from the embedded example
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with built-in defaults and no file or environment input
    pub fn empty() -> Self {
        Self {
            security_level: SecurityLevel::default(),
            limits: ExecutionLimits::default(),
            scratch_root: None,
            export_dir: None,
            grace_period_ms: default_grace_period_ms(),
        }
    }

    /// Merge per-request limits with the configured defaults
    pub fn effective_limits(&self, overrides: Option<&LimitsOverride>) -> ExecutionLimits {
        match overrides {
            Some(limits) => self.limits.with_overrides(limits),
            None => self.limits.clone(),
        }
    }

    /// Grace period as a duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_grace_period_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_strict() {
        let config = Config::default();
        assert_eq!(config.security_level, SecurityLevel::Strict);
        assert!(config.scratch_root.is_none());
        assert!(config.export_dir.is_none());
    }

    #[test]
    fn default_config_matches_default_limits() {
        let config = Config::default();
        assert_eq!(config.limits, ExecutionLimits::default());
    }

    #[test]
    fn empty_config_has_default_limits() {
        let config = Config::empty();
        assert_eq!(config.limits, ExecutionLimits::default());
        assert_eq!(config.grace_period(), Duration::from_millis(200));
    }

    #[test]
    fn effective_limits_no_override() {
        let config = Config::default();
        let result = config.effective_limits(None);
        assert_eq!(result, config.limits);
    }

    #[test]
    fn effective_limits_partial_override() {
        let config = Config::default();
        let overrides = LimitsOverride {
            max_execution_time: Some(1.5),
            ..Default::default()
        };
        let result = config.effective_limits(Some(&overrides));
        assert_eq!(result.max_execution_time, 1.5);
        // Everything else should come from the defaults
        assert_eq!(result.max_memory_mb, config.limits.max_memory_mb);
        assert_eq!(result.max_file_size_kb, config.limits.max_file_size_kb);
    }
}
