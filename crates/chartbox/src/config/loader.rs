//! Configuration file loading for chartbox
//!
//! Handles loading and parsing configuration files using the config crate.
//! Values from `CHARTBOX_*` environment variables override file values;
//! nested keys use a double underscore (`CHARTBOX_LIMITS__MAX_MEMORY_MB`).

use std::collections::HashMap;
use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, MAX_GRACE_PERIOD_MS};

impl Config {
    /// Load configuration from a file, applying environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(env_source(None))
            .build()?;

        Self::finish(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        Self::finish(config)
    }

    /// Parse configuration from a TOML string with explicit environment
    /// variables instead of the process environment
    pub fn parse_toml_with_env(
        content: &str,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .add_source(env_source(Some(env)))
            .build()?;

        Self::finish(config)
    }

    fn finish(config: ConfigBuilder) -> Result<Self, ConfigError> {
        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;

        if self.grace_period_ms > MAX_GRACE_PERIOD_MS {
            return Err(ConfigError::Invalid(format!(
                "grace_period_ms must be at most {MAX_GRACE_PERIOD_MS}, got {}",
                self.grace_period_ms
            )));
        }

        if let Some(ref root) = self.scratch_root
            && root.as_os_str().is_empty()
        {
            return Err(ConfigError::Invalid(
                "scratch_root must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_source(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecurityLevel;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.security_level, SecurityLevel::Strict);
        assert_eq!(config.limits.max_execution_time, 10.0);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
security_level = "moderate"
scratch_root = "/var/tmp/chartbox"
export_dir = "artifacts"
grace_period_ms = 50

[limits]
max_execution_time = 2.5
max_memory_mb = 64
max_output_lines = 100
max_file_size_kb = 256
"#;

        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(config.security_level, SecurityLevel::Moderate);
        assert_eq!(
            config.scratch_root,
            Some(std::path::PathBuf::from("/var/tmp/chartbox"))
        );
        assert_eq!(
            config.export_dir,
            Some(std::path::PathBuf::from("artifacts"))
        );
        assert_eq!(config.grace_period_ms, 50);
        assert_eq!(config.limits.max_execution_time, 2.5);
        assert_eq!(config.limits.max_memory_mb, 64);
        assert_eq!(config.limits.max_output_lines, 100);
        assert_eq!(config.limits.max_file_size_kb, 256);
    }

    #[test]
    fn test_partial_limits_keep_defaults() {
        let toml = r#"
[limits]
max_file_size_kb = 1
"#;

        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(config.limits.max_file_size_kb, 1);
        assert_eq!(config.limits.max_execution_time, 10.0);
        assert_eq!(config.limits.max_output_lines, 1000);
    }

    #[test]
    fn test_invalid_zero_limit() {
        let toml = r#"
[limits]
max_output_lines = 0
"#;

        let result = Config::parse_toml(toml);
        assert!(matches!(result, Err(ConfigError::Limits(_))));
    }

    #[test]
    fn test_invalid_security_level() {
        let result = Config::parse_toml(r#"security_level = "lax""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_grace_period_upper_bound() {
        let result = Config::parse_toml("grace_period_ms = 999999");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env = HashMap::from([
            ("CHARTBOX_SECURITY_LEVEL".to_string(), "permissive".to_string()),
            (
                "CHARTBOX_LIMITS__MAX_EXECUTION_TIME".to_string(),
                "1.5".to_string(),
            ),
        ]);

        let config = Config::parse_toml_with_env(
            r#"
security_level = "strict"

[limits]
max_execution_time = 9.0
"#,
            env,
        )
        .unwrap();

        assert_eq!(config.security_level, SecurityLevel::Permissive);
        assert_eq!(config.limits.max_execution_time, 1.5);
    }

    #[test]
    fn test_embedded_example_is_valid() {
        let config = Config::parse_toml(crate::config::EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.security_level, SecurityLevel::Strict);
    }
}
