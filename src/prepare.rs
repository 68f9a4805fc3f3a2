//! Preparation of raw backups with an external tool.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::debug;

use crate::config::PreparerConfig;
use crate::error::PrepareError;

/// Produces the command that brings a staged backup into a restorable state
pub trait BackupPreparer: Send + Sync {
    /// Command for the node with the given index, operating on `backup_dir`
    fn command(&self, node_index: usize, backup_dir: &Path) -> Command;
}

impl<T: BackupPreparer + ?Sized> BackupPreparer for Arc<T> {
    fn command(&self, node_index: usize, backup_dir: &Path) -> Command {
        (**self).command(node_index, backup_dir)
    }
}

/// Runs `xtrabackup --prepare` on the staged backup
#[derive(Debug, Clone)]
pub struct XtraBackupPreparer {
    binary: PathBuf,
    args: Vec<String>,
}

impl XtraBackupPreparer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn from_config(config: &PreparerConfig) -> Self {
        Self::new(&config.binary).with_args(config.args.clone())
    }
}

impl BackupPreparer for XtraBackupPreparer {
    fn command(&self, _node_index: usize, backup_dir: &Path) -> Command {
        let mut target_dir = std::ffi::OsString::from("--target-dir=");
        target_dir.push(backup_dir);

        let mut command = Command::new(&self.binary);
        command.arg("--prepare").arg(target_dir).args(&self.args);
        command
    }
}

/// Run a preparation command to completion and check its exit status
pub fn run(mut command: Command) -> Result<(), PrepareError> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!("Running preparation command {:?}", command);

    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|source| PrepareError::Spawn {
            program: program.clone(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    Err(PrepareError::Failed {
        program,
        status: output.status,
        stderr: tail(&String::from_utf8_lossy(&output.stderr), 20),
    })
}

/// Last `lines` lines of a tool's output, the part that usually holds the error
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
