//! Streaming backup client
//!
//! Main binary entry point for the command-line interface.

use std::process::ExitCode;

use clap::Parser;
use streaming_backup_client::cli::{backup, decrypt, Cli, Commands};
use streaming_backup_client::{logging, Result};

fn run(cli: Cli) -> Result<()> {
    match &cli.log_file {
        Some(path) => logging::init_file_logging(path, cli.verbose)?,
        None => logging::init_logging(cli.verbose)?,
    }

    match cli.command {
        Commands::Backup(args) => backup::run(args),
        Commands::Decrypt(args) => decrypt::run(args),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
