//! A library for sandboxed execution of chart-rendering snippets.
//!
//! Chartbox runs short, untrusted, Python-flavoured snippets that produce
//! charts. Snippets are validated statically, then interpreted in-process
//! against a capability table that binds only what the active security
//! level allows. Each run is bounded by a wall clock deadline, a memory
//! ceiling and output limits, and the SVG files it writes are collected
//! from a per-run scratch directory that is removed afterwards.
//!
//! # Features
//!
//! - **Static validation**: forbidden imports, calls and attributes are
//!   rejected before anything runs.
//! - **Capability environment**: no filesystem, process or network access
//!   exists unless the builder binds it.
//! - **Bounded execution**: deadline, memory ceiling, recursion limit and
//!   captured output.
//! - **Artifact collection**: size-checked files reported by name only.
//! - **TOML configuration** with `CHARTBOX_*` environment overrides.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG};
pub use environment::Environment;
pub use executor::{Context, Sandbox, ScratchError, execute_code};
pub use types::{
    ExecutionLimits, ExecutionResult, ExecutionStatus, LimitsError, LimitsOverride, SecurityLevel,
};
pub use validator::{ValidationFinding, validate};

pub mod chart;
pub mod config;
pub mod environment;
pub mod executor;
pub mod runtime;
pub mod script;
pub mod types;
pub mod validator;
