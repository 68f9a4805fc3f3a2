//! Backup command implementation.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use crate::backup::{Orchestrator, RunReport};
use crate::config::Config;
use crate::Result;

/// Printed when no node produced an artifact, followed by every node error
pub const ALL_FAILED_MESSAGE: &str =
    "All backups failed. Not able to generate a valid backup artifact. See error(s) below:";

/// Arguments for the backup command
#[derive(Args)]
pub struct BackupArgs {
    /// Configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Write a JSON summary of the run to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Run the backup command
pub fn run(args: BackupArgs) -> Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration {}", args.config.display()))?;
    let orchestrator =
        Orchestrator::from_config(config).context("setting up backup collaborators")?;

    let result = orchestrator.run();

    if let Some(path) = &args.report {
        RunReport::from_result(&result).write(path)?;
        info!("Run report written to {}", path.display());
    }

    let result = result
        .into_result()
        .map_err(|e| anyhow::anyhow!("{} {}", ALL_FAILED_MESSAGE, e))?;

    println!("Backup completed: {} of {} node(s) succeeded", result.success_count(), result.len());
    for success in result.successes() {
        println!("  {}", success.artifact.archive.display());
        println!("  {}", success.artifact.metadata.display());
    }

    Ok(())
}
