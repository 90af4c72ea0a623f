//! Integration tests for chartbox
//!
//! Every test runs snippets through the public API. Tests that need to
//! inspect scratch directories point `scratch_root` at their own temporary
//! directory so concurrent tests never see each other's files.

use std::fs;
use std::path::Path;

use chartbox::{Config, ExecutionLimits};

mod artifacts;
mod async_api;
mod config_loading;
mod execution;
mod isolation;
mod validation;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture snippet content
pub(crate) fn fixture_snippet(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/snippets/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Config whose scratch directories live under `root`
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::empty();
    config.scratch_root = Some(root.to_path_buf());
    config.limits = ExecutionLimits::new().with_max_execution_time(5.0);
    config
}

/// Entries left under a scratch root
pub(crate) fn leftover_entries(root: &Path) -> usize {
    fs::read_dir(root).map(|entries| entries.count()).unwrap_or(0)
}
