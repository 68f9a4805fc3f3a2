//! # Streaming backup client
//!
//! Streams physical MySQL backups from every node of a cluster, prepares them
//! with xtrabackup, and packs each one into an encrypted archive with a
//! plain-text metadata file next to it.
//!
//! ## Features
//!
//! - **Per-node pipeline**: stream, prepare, archive, encrypt and promote, with
//!   staging directories and temporary files removed on every path
//! - **Partial success**: a run fails only when no node produced an artifact
//! - **Pluggable collaborators**: downloader, preparer, archiver and encryption
//!   are traits, so tests and alternative transports can swap them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streaming_backup_client::backup::Orchestrator;
//! use streaming_backup_client::config::Config;
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load(Path::new("backup.toml"))?;
//! let orchestrator = Orchestrator::from_config(config)?;
//!
//! let result = orchestrator.execute()?;
//! println!("{} node(s) backed up", result.success_count());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod download;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod prepare;
pub mod staging;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use backup::{AggregateResult, Collaborators, Orchestrator};
pub use config::Config;
pub use error::{AggregateError, NodeError};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
