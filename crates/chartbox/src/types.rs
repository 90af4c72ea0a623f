use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Policy knob selecting how permissive the module allow-list is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Only explicitly listed modules may be imported
    #[default]
    Strict,

    /// Sub-modules of listed modules are accepted as well
    Moderate,

    /// Any module that is not explicitly denied is accepted
    Permissive,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Strict => "strict",
            SecurityLevel::Moderate => "moderate",
            SecurityLevel::Permissive => "permissive",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SecurityLevel::Strict),
            "moderate" => Ok(SecurityLevel::Moderate),
            "permissive" => Ok(SecurityLevel::Permissive),
            other => Err(format!(
                "unknown security level '{other}' (expected strict, moderate or permissive)"
            )),
        }
    }
}

/// Limits that fail validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LimitsError {
    #[error("max_execution_time must be a positive, representable number of seconds, got {0}")]
    ExecutionTime(f64),

    #[error("max_memory_mb must be positive")]
    Memory,

    #[error("max_output_lines must be positive")]
    OutputLines,

    #[error("max_file_size_kb must be positive")]
    FileSize,
}

/// Resource ceilings for a single invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Wall clock limit in seconds
    #[serde(default = "default_execution_time")]
    pub max_execution_time: f64,

    /// Largest single allocation the interpreter will make, in megabytes
    #[serde(default = "default_memory_mb")]
    pub max_memory_mb: u64,

    /// Lines kept from each of stdout and stderr
    #[serde(default = "default_output_lines")]
    pub max_output_lines: usize,

    /// Largest artifact reported back to the caller, in kilobytes
    #[serde(default = "default_file_size_kb")]
    pub max_file_size_kb: u64,
}

fn default_execution_time() -> f64 {
    10.0
}

fn default_memory_mb() -> u64 {
    100
}

fn default_output_lines() -> usize {
    1000
}

fn default_file_size_kb() -> u64 {
    5000
}

impl ExecutionLimits {
    /// 1 kilobyte in bytes
    pub const KB: u64 = 1024;
    /// 1 megabyte in bytes
    pub const MB: u64 = 1024 * 1024;

    /// Create limits with the default ceilings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wall clock limit in seconds
    pub fn with_max_execution_time(mut self, seconds: f64) -> Self {
        self.max_execution_time = seconds;
        self
    }

    /// Set the allocation ceiling in megabytes
    pub fn with_max_memory_mb(mut self, mb: u64) -> Self {
        self.max_memory_mb = mb;
        self
    }

    /// Set the number of captured output lines
    pub fn with_max_output_lines(mut self, lines: usize) -> Self {
        self.max_output_lines = lines;
        self
    }

    /// Set the artifact size ceiling in kilobytes
    pub fn with_max_file_size_kb(mut self, kb: u64) -> Self {
        self.max_file_size_kb = kb;
        self
    }

    /// Check that every ceiling is positive and the deadline fits a [`Duration`]
    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.max_execution_time <= 0.0
            || Duration::try_from_secs_f64(self.max_execution_time).is_err()
        {
            return Err(LimitsError::ExecutionTime(self.max_execution_time));
        }
        if self.max_memory_mb == 0 {
            return Err(LimitsError::Memory);
        }
        if self.max_output_lines == 0 {
            return Err(LimitsError::OutputLines);
        }
        if self.max_file_size_kb == 0 {
            return Err(LimitsError::FileSize);
        }
        Ok(())
    }

    /// Deadline as a duration; saturates for limits that fail validation
    pub fn deadline(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_execution_time).unwrap_or(Duration::MAX)
    }

    /// Allocation ceiling in bytes
    pub fn memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(Self::MB)
    }

    /// Artifact ceiling in bytes
    pub fn file_size_bytes(&self) -> u64 {
        self.max_file_size_kb.saturating_mul(Self::KB)
    }

    /// Apply overrides, preferring values from `overrides` when present
    pub fn with_overrides(&self, overrides: &LimitsOverride) -> ExecutionLimits {
        ExecutionLimits {
            max_execution_time: overrides
                .max_execution_time
                .unwrap_or(self.max_execution_time),
            max_memory_mb: overrides.max_memory_mb.unwrap_or(self.max_memory_mb),
            max_output_lines: overrides.max_output_lines.unwrap_or(self.max_output_lines),
            max_file_size_kb: overrides.max_file_size_kb.unwrap_or(self.max_file_size_kb),
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_execution_time: default_execution_time(),
            max_memory_mb: default_memory_mb(),
            max_output_lines: default_output_lines(),
            max_file_size_kb: default_file_size_kb(),
        }
    }
}

/// Partial limits supplied per request (e.g. from CLI flags)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsOverride {
    #[serde(default)]
    pub max_execution_time: Option<f64>,
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
    #[serde(default)]
    pub max_output_lines: Option<usize>,
    #[serde(default)]
    pub max_file_size_kb: Option<u64>,
}

impl LimitsOverride {
    pub fn is_empty(&self) -> bool {
        self.max_execution_time.is_none()
            && self.max_memory_mb.is_none()
            && self.max_output_lines.is_none()
            && self.max_file_size_kb.is_none()
    }
}

/// Terminal status of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Program ran to completion
    Success,

    /// Wall clock deadline fired before the program returned
    Timeout,

    /// Program matched a denied construct; it never ran
    SecurityViolation,

    /// A module could not be imported at run time
    ImportError,

    /// Any other fault raised while running
    RuntimeError,

    /// Program failed to parse
    ValidationError,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::SecurityViolation => "security_violation",
            ExecutionStatus::ImportError => "import_error",
            ExecutionStatus::RuntimeError => "runtime_error",
            ExecutionStatus::ValidationError => "validation_error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an invocation
///
/// This is the only thing the sandbox hands back; failures inside the
/// sandbox are reported through `status` and `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,

    /// `true` exactly when `status` is [`ExecutionStatus::Success`]
    pub success: bool,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Short diagnostic, e.g. `ZeroDivisionError: division by zero`
    pub error: Option<String>,

    /// Measured wall time in seconds
    pub execution_time: f64,

    /// Artifact file names (never host paths)
    pub generated_files: Vec<String>,

    /// Reasons for a rejection, dropped artifacts and truncated output
    pub security_warnings: Vec<String>,

    /// Estimated bytes held by the program's globals at exit, 0 if unmeasured
    pub memory_used: u64,
}

impl ExecutionResult {
    /// Create an empty result with the given status
    pub fn new(status: ExecutionStatus) -> Self {
        Self {
            status,
            success: status == ExecutionStatus::Success,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            execution_time: 0.0,
            generated_files: Vec::new(),
            security_warnings: Vec::new(),
            memory_used: 0,
        }
    }

    /// Result for a program that failed static checks
    pub fn rejected(status: ExecutionStatus, warnings: Vec<String>) -> Self {
        let error = warnings.first().cloned();
        Self {
            error,
            security_warnings: warnings,
            ..Self::new(status)
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self::new(ExecutionStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_default_values() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_execution_time, 10.0);
        assert_eq!(limits.max_memory_mb, 100);
        assert_eq!(limits.max_output_lines, 1000);
        assert_eq!(limits.max_file_size_kb, 5000);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn limits_builder_methods() {
        let limits = ExecutionLimits::new()
            .with_max_execution_time(2.5)
            .with_max_memory_mb(16)
            .with_max_output_lines(10)
            .with_max_file_size_kb(1);

        assert_eq!(limits.max_execution_time, 2.5);
        assert_eq!(limits.max_memory_mb, 16);
        assert_eq!(limits.max_output_lines, 10);
        assert_eq!(limits.max_file_size_kb, 1);
        assert_eq!(limits.memory_bytes(), 16 * 1024 * 1024);
        assert_eq!(limits.file_size_bytes(), 1024);
    }

    #[test]
    fn limits_reject_non_positive_values() {
        let zero_time = ExecutionLimits::new().with_max_execution_time(0.0);
        assert_eq!(zero_time.validate(), Err(LimitsError::ExecutionTime(0.0)));

        let nan_time = ExecutionLimits::new().with_max_execution_time(f64::NAN);
        assert!(nan_time.validate().is_err());

        let negative = ExecutionLimits::new().with_max_execution_time(-1.0);
        assert!(negative.validate().is_err());

        let endless = ExecutionLimits::new().with_max_execution_time(1e20);
        assert_eq!(endless.validate(), Err(LimitsError::ExecutionTime(1e20)));
        assert_eq!(endless.deadline(), Duration::MAX);

        let infinite = ExecutionLimits::new().with_max_execution_time(f64::INFINITY);
        assert!(infinite.validate().is_err());

        assert_eq!(
            ExecutionLimits::new().with_max_memory_mb(0).validate(),
            Err(LimitsError::Memory)
        );
        assert_eq!(
            ExecutionLimits::new().with_max_output_lines(0).validate(),
            Err(LimitsError::OutputLines)
        );
        assert_eq!(
            ExecutionLimits::new().with_max_file_size_kb(0).validate(),
            Err(LimitsError::FileSize)
        );
    }

    #[test]
    fn limits_deserialize_partial_table() {
        let limits: ExecutionLimits =
            serde_json::from_str(r#"{"max_execution_time": 3.0}"#).unwrap();
        assert_eq!(limits.max_execution_time, 3.0);
        assert_eq!(limits.max_memory_mb, 100);
    }

    #[test]
    fn with_overrides_partial_override() {
        let base = ExecutionLimits::default();
        let overrides = LimitsOverride {
            max_execution_time: Some(1.0),
            max_file_size_kb: Some(8),
            ..Default::default()
        };

        let result = base.with_overrides(&overrides);
        assert_eq!(result.max_execution_time, 1.0);
        assert_eq!(result.max_file_size_kb, 8);
        assert_eq!(result.max_memory_mb, base.max_memory_mb);
        assert_eq!(result.max_output_lines, base.max_output_lines);
    }

    #[test]
    fn limits_override_is_empty() {
        assert!(LimitsOverride::default().is_empty());
        let some = LimitsOverride {
            max_memory_mb: Some(1),
            ..Default::default()
        };
        assert!(!some.is_empty());
    }

    #[test]
    fn security_level_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<SecurityLevel>(), Ok(SecurityLevel::Strict));
        assert_eq!(
            " moderate ".parse::<SecurityLevel>(),
            Ok(SecurityLevel::Moderate)
        );
        assert_eq!(
            "permissive".parse::<SecurityLevel>(),
            Ok(SecurityLevel::Permissive)
        );
        assert!("open".parse::<SecurityLevel>().is_err());
    }

    #[test]
    fn security_level_default_is_strict() {
        assert_eq!(SecurityLevel::default(), SecurityLevel::Strict);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::SecurityViolation).unwrap();
        assert_eq!(json, "\"security_violation\"");
        assert_eq!(ExecutionStatus::ImportError.to_string(), "import_error");
    }

    #[test]
    fn result_success_flag_tracks_status() {
        assert!(ExecutionResult::new(ExecutionStatus::Success).is_success());
        assert!(!ExecutionResult::new(ExecutionStatus::Timeout).is_success());
        assert!(!ExecutionResult::new(ExecutionStatus::RuntimeError).is_success());
    }

    #[test]
    fn rejected_result_carries_first_warning_as_error() {
        let result = ExecutionResult::rejected(
            ExecutionStatus::SecurityViolation,
            vec!["call to 'eval' is not allowed".into(), "second".into()],
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("call to 'eval' is not allowed"));
        assert_eq!(result.security_warnings.len(), 2);
        assert!(result.generated_files.is_empty());
    }
}
