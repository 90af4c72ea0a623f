use std::collections::HashMap;

use chartbox::{Config, SecurityLevel};

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.security_level, SecurityLevel::Moderate);
    assert_eq!(config.grace_period_ms, 100);
    assert_eq!(config.limits.max_execution_time, 2.0);
    assert_eq!(config.limits.max_memory_mb, 32);
    assert_eq!(config.limits.max_output_lines, 50);
    assert_eq!(config.limits.max_file_size_kb, 64);
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.security_level, SecurityLevel::Strict);
    assert_eq!(config.limits, chartbox::ExecutionLimits::default());
    assert!(config.scratch_root.is_none());
    assert!(config.export_dir.is_none());
}

#[test]
fn test_load_invalid_zero_limit() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_zero_limit.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_level() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_level.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_grace_period() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_grace_period.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_missing_file() {
    let path = format!("{FIXTURES_PATH}/configs/does_not_exist.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_environment_overrides_file() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let content = std::fs::read_to_string(path).unwrap();
    let env = HashMap::from([
        ("CHARTBOX_SECURITY_LEVEL".to_string(), "permissive".to_string()),
        ("CHARTBOX_LIMITS__MAX_OUTPUT_LINES".to_string(), "7".to_string()),
    ]);

    let config = Config::parse_toml_with_env(&content, env).unwrap();
    assert_eq!(config.security_level, SecurityLevel::Permissive);
    assert_eq!(config.limits.max_output_lines, 7);
    assert_eq!(config.limits.max_memory_mb, 32);
}

#[test]
fn test_example_config_is_the_default() {
    let config = Config::parse_toml(chartbox::EXAMPLE_CONFIG).unwrap();
    assert_eq!(config.security_level, Config::default().security_level);
    assert_eq!(config.limits, Config::empty().limits);
}
