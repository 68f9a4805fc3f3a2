//! Per-node staging directories.
//!
//! A [`StagingDir`] owns its directory: dropping it removes the whole tree,
//! so the directory is released on every exit path of a node job, including
//! unwinding. [`StagingDir::release`] does the same but reports removal errors.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// Hands out isolated working directories under a common root
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty directory for the job with the given node index.
    ///
    /// Names combine the node index with a random suffix, so concurrent and
    /// repeated calls never collide.
    pub fn acquire(&self, node_index: usize) -> io::Result<StagingDir> {
        std::fs::create_dir_all(&self.root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("backup-node-{}-", node_index))
            .tempdir_in(&self.root)?;
        debug!("Acquired staging directory {}", dir.path().display());
        Ok(StagingDir { dir })
    }
}

/// A staging directory that is removed when released or dropped
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything below it
    pub fn release(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Released staging directory {}", path.display());
        Ok(())
    }
}
