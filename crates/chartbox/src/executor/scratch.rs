//! Per-invocation scratch directory

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// Prefix of every scratch directory name
pub const SCRATCH_PREFIX: &str = "chartbox-";

#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("failed to create scratch directory under {root}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove scratch directory {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A uniquely named directory that is removed with everything in it when
/// closed or dropped
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under `root`, or the system temp dir
    pub fn create(root: Option<&Path>) -> Result<Self, ScratchError> {
        let root = root.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let create_err = |source: io::Error| ScratchError::Create {
            root: root.clone(),
            source,
        };

        std::fs::create_dir_all(&root).map_err(create_err)?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&root)
            .map_err(create_err)?;

        debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory, reporting failure instead of ignoring it
    pub fn close(self) -> Result<(), ScratchError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| ScratchError::Remove { path, source })
    }
}
