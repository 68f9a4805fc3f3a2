//! The per-node backup pipeline.
//!
//! A node job moves through [`JobStage`]s: the backup stream is extracted
//! into a private staging directory, prepared by the external tool, packed
//! into an archive that is encrypted while it streams into a hidden temporary
//! file, described by a metadata file, and finally promoted into the output
//! directory. Any failure ends the job with a [`NodeError`] for that stage.
//! The staging directory and temporary files are removed on every path.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, span, warn, Level};
use uuid::Uuid;
use walkdir::WalkDir;

use super::artifact::{write_synced, ArtifactNames, PendingArtifact};
use crate::archive::Archiver;
use crate::config::Config;
use crate::crypto::Encryption;
use crate::download::{Downloader, StreamedWriter};
use crate::error::{ArchiveError, EncryptionError, NodeError};
use crate::metadata::{BackupInfo, BackupMetadata, CompletedJob};
use crate::prepare::{self, BackupPreparer};
use crate::staging::StagingArea;

/// External capabilities a node job relies on
pub struct Collaborators {
    pub downloader: Box<dyn Downloader>,
    pub preparer: Box<dyn BackupPreparer>,
    pub archiver: Box<dyn Archiver>,
    pub encryption: Box<dyn Encryption>,
}

/// One configured node, identified by its position in the node list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeJob {
    pub index: usize,
    pub address: String,
}

impl NodeJob {
    pub fn new(index: usize, address: impl Into<String>) -> Self {
        Self {
            index,
            address: address.into(),
        }
    }
}

/// States of a node job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Streaming,
    Preparing,
    Archiving,
    Encrypting,
    EmittingMetadata,
    Promoting,
    Done,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Streaming => "streaming",
            JobStage::Preparing => "preparing",
            JobStage::Archiving => "archiving",
            JobStage::Encrypting => "encrypting",
            JobStage::EmittingMetadata => "emitting metadata",
            JobStage::Promoting => "promoting",
            JobStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Size of a prepared backup directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StagedSize {
    pub files: u64,
    pub bytes: u64,
}

impl StagedSize {
    pub fn measure(dir: &Path) -> Self {
        let mut size = Self::default();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping entry while measuring backup: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_file() {
                size.files += 1;
                size.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        size
    }
}

/// A successfully produced artifact pair
#[derive(Debug, Clone)]
pub struct NodeArtifact {
    pub uuid: Uuid,
    pub archive: PathBuf,
    pub metadata: PathBuf,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub prepared: StagedSize,
}

/// Runs node jobs against one configuration and one set of collaborators
pub struct NodePipeline<'a> {
    config: &'a Config,
    collaborators: &'a Collaborators,
    staging: &'a StagingArea,
    run_stamp: &'a str,
}

impl<'a> NodePipeline<'a> {
    /// `run_stamp` is shared by every artifact of the run
    pub fn new(
        config: &'a Config,
        collaborators: &'a Collaborators,
        staging: &'a StagingArea,
        run_stamp: &'a str,
    ) -> Self {
        Self {
            config,
            collaborators,
            staging,
            run_stamp,
        }
    }

    /// Back up one node into one artifact pair
    pub fn run(&self, job: &NodeJob) -> Result<NodeArtifact, NodeError> {
        let span = span!(Level::INFO, "node_backup", index = job.index, address = %job.address);
        let _enter = span.enter();

        let staging = self.staging.acquire(job.index).map_err(NodeError::Staging)?;
        let result = self.run_staged(job, staging.path());

        if let Err(e) = staging.release() {
            warn!("Failed to remove staging directory: {}", e);
        }
        result
    }

    fn run_staged(&self, job: &NodeJob, staging: &Path) -> Result<NodeArtifact, NodeError> {
        enter(JobStage::Streaming);
        let mut extractor = StagingExtractor {
            archiver: self.collaborators.archiver.as_ref(),
            dest: staging,
        };
        self.collaborators
            .downloader
            .download_backup(&job.address, &mut extractor)?;

        enter(JobStage::Preparing);
        let started = Utc::now();
        let command = self.collaborators.preparer.command(job.index, staging);
        prepare::run(command)?;

        let prepared = StagedSize::measure(staging);
        info!(
            "Prepared backup: {} files, {} bytes",
            prepared.files, prepared.bytes
        );

        let info = BackupInfo::read_from(staging).unwrap_or_else(|e| {
            warn!("Could not read backup info, metadata will be incomplete: {}", e);
            BackupInfo::default()
        });

        let uuid = Uuid::new_v4();
        let names = ArtifactNames::new(
            &self.config.artifact_prefix,
            self.run_stamp,
            job.index,
            &uuid,
            self.collaborators.encryption.archive_suffix(),
        );
        let pending = PendingArtifact::new(&self.config.output_dir, &names);

        enter(JobStage::Archiving);
        let finished = self.write_archive(staging, pending.archive_tmp())?;

        enter(JobStage::EmittingMetadata);
        let metadata = BackupMetadata::build(
            &CompletedJob {
                uuid,
                artifact_id: names.id(),
                info: &info,
                started,
                finished,
            },
            self.config,
        );
        write_synced(pending.metadata_tmp(), metadata.render().as_bytes())
            .map_err(NodeError::MetadataWrite)?;

        enter(JobStage::Promoting);
        let promoted = pending.promote().map_err(NodeError::Promotion)?;

        enter(JobStage::Done);
        Ok(NodeArtifact {
            uuid,
            archive: promoted.archive,
            metadata: promoted.metadata,
            started,
            finished,
            prepared,
        })
    }

    /// Pack the staging directory and stream it through encryption into `tmp_path`.
    ///
    /// Returns the moment archiving completed.
    fn write_archive(&self, staging: &Path, tmp_path: &Path) -> Result<DateTime<Utc>, NodeError> {
        let file = File::create(tmp_path).map_err(encryption_io)?;
        let mut out = BufWriter::new(file);

        let mut archive = self.collaborators.archiver.create(staging)?;
        enter(JobStage::Encrypting);
        let encrypted = self.collaborators.encryption.encrypt(
            &self.config.symmetric_key,
            &mut archive,
            &mut out,
        );
        let archived = archive.finish();
        let finished = Utc::now();

        // an encryption failure stops the archiver too, so it is the root cause
        match (encrypted, archived) {
            (Err(e), _) => return Err(NodeError::Encryption(e)),
            (Ok(_), Err(e)) => return Err(NodeError::Archive(e)),
            (Ok(bytes), Ok(())) => debug!("Encrypted {} archive bytes", bytes),
        }

        let file = out
            .into_inner()
            .map_err(|e| encryption_io(e.into_error()))?;
        file.sync_all().map_err(encryption_io)?;
        Ok(finished)
    }
}

fn enter(stage: JobStage) {
    debug!("Entering stage: {}", stage);
}

fn encryption_io(err: io::Error) -> NodeError {
    NodeError::Encryption(EncryptionError::Io(err))
}

/// Extracts the downloaded stream straight into the staging directory
struct StagingExtractor<'a> {
    archiver: &'a dyn Archiver,
    dest: &'a Path,
}

impl StreamedWriter for StagingExtractor<'_> {
    fn write_stream(&mut self, stream: &mut dyn Read) -> Result<(), ArchiveError> {
        self.archiver.extract(stream, self.dest)
    }
}
