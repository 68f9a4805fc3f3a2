//! Decrypt command implementation.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::config::Config;
use crate::crypto;
use crate::Result;

/// Arguments for the decrypt command
#[derive(Args)]
pub struct DecryptArgs {
    /// Configuration file holding the symmetric key
    #[arg(short, long)]
    pub config: PathBuf,

    /// Encrypted archive to read
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the decrypted tar archive
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Run the decrypt command
pub fn run(args: DecryptArgs) -> Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration {}", args.config.display()))?;
    let encryption = crypto::provider(&config)?;

    let input = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let output = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);
    let bytes = encryption
        .decrypt(&config.symmetric_key, &mut reader, &mut writer)
        .with_context(|| format!("decrypting {}", args.input.display()))?;
    writer.flush()?;

    println!("Decrypted {} bytes into {}", bytes, args.output.display());
    Ok(())
}
