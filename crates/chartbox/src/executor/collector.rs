//! Artifact collection from the scratch directory

use std::path::Path;

use tracing::{debug, warn};

use crate::types::ExecutionLimits;

/// Artifacts accepted from one scratch directory
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collected {
    /// File names, sorted
    pub files: Vec<String>,
    /// One entry per file that was dropped
    pub warnings: Vec<String>,
}

/// List regular files directly inside `dir`, dropping those over the size
/// ceiling
///
/// Subdirectories, symlinks and names that are not valid UTF-8 are skipped.
/// Only names are reported, never host paths.
pub fn collect(dir: &Path, limits: &ExecutionLimits) -> Collected {
    let mut collected = Collected::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "could not list scratch directory");
            collected
                .warnings
                .push("generated files could not be listed".to_string());
            return collected;
        }
    };

    let mut found: Vec<(String, u64)> = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        found.push((name, metadata.len()));
    }
    found.sort();

    let ceiling = limits.file_size_bytes();
    for (name, size) in found {
        if size > ceiling {
            let size_kb = size.div_ceil(ExecutionLimits::KB);
            warn!(file = %name, size_kb, limit_kb = limits.max_file_size_kb, "artifact dropped");
            collected.warnings.push(format!(
                "artifact '{name}' is {size_kb} KB, exceeding the {} KB limit",
                limits.max_file_size_kb
            ));
        } else {
            collected.files.push(name);
        }
    }

    debug!(
        accepted = collected.files.len(),
        dropped = collected.warnings.len(),
        "artifacts collected"
    );
    collected
}

/// Copy accepted artifacts from `dir` into `export_dir`
///
/// Returns a warning per file that could not be copied.
pub fn export(dir: &Path, files: &[String], export_dir: &Path) -> Vec<String> {
    if let Err(err) = std::fs::create_dir_all(export_dir) {
        warn!(error = %err, dir = %export_dir.display(), "could not create export directory");
        return vec!["generated files could not be exported".to_string()];
    }

    let mut warnings = Vec::new();
    for name in files {
        if let Err(err) = std::fs::copy(dir.join(name), export_dir.join(name)) {
            warn!(file = %name, error = %err, "artifact export failed");
            warnings.push(format!("artifact '{name}' could not be exported"));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits_kb(kb: u64) -> ExecutionLimits {
        ExecutionLimits::new().with_max_file_size_kb(kb)
    }

    #[test]
    fn lists_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.svg"), "b").unwrap();
        std::fs::write(dir.path().join("a.svg"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.svg"), "c").unwrap();

        let collected = collect(dir.path(), &limits_kb(1));
        assert_eq!(collected.files, vec!["a.svg", "b.svg"]);
        assert!(collected.warnings.is_empty());
    }

    #[test]
    fn oversize_files_are_dropped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.svg"), vec![b'x'; 3 * 1024]).unwrap();
        std::fs::write(dir.path().join("small.svg"), "ok").unwrap();

        let collected = collect(dir.path(), &limits_kb(2));
        assert_eq!(collected.files, vec!["small.svg"]);
        assert_eq!(
            collected.warnings,
            vec!["artifact 'big.svg' is 3 KB, exceeding the 2 KB limit"]
        );
    }

    #[test]
    fn file_at_the_limit_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("edge.svg"), vec![b'x'; 1024]).unwrap();
        assert_eq!(collect(dir.path(), &limits_kb(1)).files, vec!["edge.svg"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/etc/hostname", dir.path().join("link.svg")).unwrap();
        assert!(collect(dir.path(), &limits_kb(1)).files.is_empty());
    }

    #[test]
    fn missing_directory_yields_warning() {
        let collected = collect(Path::new("/nonexistent/chartbox-scratch"), &limits_kb(1));
        assert!(collected.files.is_empty());
        assert_eq!(collected.warnings.len(), 1);
    }

    #[test]
    fn export_copies_accepted_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chart.svg"), "<svg/>").unwrap();

        let warnings = export(dir.path(), &["chart.svg".to_string()], &out.path().join("exports"));
        assert!(warnings.is_empty());
        let copied = std::fs::read_to_string(out.path().join("exports").join("chart.svg")).unwrap();
        assert_eq!(copied, "<svg/>");
    }
}
