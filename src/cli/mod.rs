//! Command-line interface for the streaming backup client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod backup;
pub mod decrypt;

/// Streams physical database backups from cluster nodes into encrypted archives
#[derive(Parser)]
#[command(name = "streaming-backup-client")]
#[command(about = "Streams physical database backups from cluster nodes into prepared, encrypted archives")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Back up every configured node
    Backup(backup::BackupArgs),
    /// Decrypt a backup artifact with the configured key
    Decrypt(decrypt::DecryptArgs),
}
