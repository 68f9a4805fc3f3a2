//! Multi-node orchestration and result aggregation.
//!
//! Every configured node is attempted exactly once, whatever happened to the
//! nodes before it. The run succeeds when at least one node produced an
//! artifact; only when all nodes failed does it return an [`AggregateError`].

use std::fs;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{error, info, warn};

use super::pipeline::{Collaborators, NodeArtifact, NodeJob, NodePipeline};
use crate::archive::SystemTar;
use crate::config::Config;
use crate::crypto;
use crate::download::HttpDownloader;
use crate::error::{AggregateError, NodeFailure, SetupError};
use crate::prepare::XtraBackupPreparer;
use crate::staging::StagingArea;

const RUN_STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

impl Collaborators {
    /// The HTTP downloader, xtrabackup preparer, system tar and the configured encryption
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        Ok(Self {
            downloader: Box::new(HttpDownloader::from_config(&config.backup_server)?),
            preparer: Box::new(XtraBackupPreparer::from_config(&config.preparer)),
            archiver: Box::new(SystemTar::default()),
            encryption: crypto::provider(config)?,
        })
    }
}

/// A node that produced its artifact
#[derive(Debug)]
pub struct NodeSuccess {
    pub index: usize,
    pub address: String,
    pub artifact: NodeArtifact,
}

/// Outcome of one node job
#[derive(Debug)]
pub enum NodeOutcome {
    Succeeded(NodeSuccess),
    Failed(NodeFailure),
}

impl NodeOutcome {
    pub fn index(&self) -> usize {
        match self {
            NodeOutcome::Succeeded(success) => success.index,
            NodeOutcome::Failed(failure) => failure.index,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            NodeOutcome::Succeeded(success) => &success.address,
            NodeOutcome::Failed(failure) => &failure.address,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Succeeded(_))
    }
}

/// Outcomes of all node jobs of a run, in configured node order
#[derive(Debug)]
pub struct AggregateResult {
    outcomes: Vec<NodeOutcome>,
}

impl AggregateResult {
    pub fn new(outcomes: Vec<NodeOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[NodeOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &NodeSuccess> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            NodeOutcome::Succeeded(success) => Some(success),
            NodeOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeFailure> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            NodeOutcome::Failed(failure) => Some(failure),
            NodeOutcome::Succeeded(_) => None,
        })
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// A run succeeds when at least one node succeeded
    pub fn is_success(&self) -> bool {
        self.success_count() > 0
    }

    /// Apply the partial-success policy
    pub fn into_result(self) -> Result<Self, AggregateError> {
        if self.is_success() {
            return Ok(self);
        }
        let failures = self
            .outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                NodeOutcome::Failed(failure) => Some(failure),
                NodeOutcome::Succeeded(_) => None,
            })
            .collect();
        Err(AggregateError::new(failures))
    }
}

/// Backs up every configured node and aggregates the outcomes
pub struct Orchestrator {
    config: Config,
    collaborators: Collaborators,
    staging: StagingArea,
}

impl Orchestrator {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let staging = StagingArea::new(&config.staging_dir);
        Self {
            config,
            collaborators,
            staging,
        }
    }

    /// Build an orchestrator with the default collaborators
    pub fn from_config(config: Config) -> Result<Self, SetupError> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::new(config, collaborators))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Run every node job and fail only if none of them succeeded
    pub fn execute(&self) -> Result<AggregateResult, AggregateError> {
        self.run().into_result()
    }

    /// Run every node job and return all outcomes
    pub fn run(&self) -> AggregateResult {
        let run_stamp = Utc::now().format(RUN_STAMP_FORMAT).to_string();
        let jobs: Vec<NodeJob> = self
            .config
            .nodes
            .iter()
            .enumerate()
            .map(|(index, address)| NodeJob::new(index, address.as_str()))
            .collect();

        info!(
            "Starting backup of {} node(s) into {}",
            jobs.len(),
            self.config.output_dir.display()
        );
        if let Err(e) = fs::create_dir_all(&self.config.output_dir) {
            // every node will fail to write its artifact and report why
            warn!(
                "Failed to create output directory {}: {}",
                self.config.output_dir.display(),
                e
            );
        }

        let pipeline = NodePipeline::new(
            &self.config,
            &self.collaborators,
            &self.staging,
            &run_stamp,
        );

        let outcomes = if self.config.parallelism > 1 && jobs.len() > 1 {
            self.run_parallel(&pipeline, &jobs)
        } else {
            jobs.iter().map(|job| run_node(&pipeline, job)).collect()
        };

        let result = AggregateResult::new(outcomes);
        info!(
            "Backup run finished: {} of {} node(s) succeeded",
            result.success_count(),
            result.len()
        );
        result
    }

    fn run_parallel(&self, pipeline: &NodePipeline<'_>, jobs: &[NodeJob]) -> Vec<NodeOutcome> {
        let threads = self.config.parallelism.min(jobs.len());
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            // indexed collect keeps the outcomes in node order
            Ok(pool) => pool.install(|| {
                jobs.par_iter()
                    .map(|job| run_node(pipeline, job))
                    .collect()
            }),
            Err(e) => {
                warn!("Failed to start worker pool, backing up sequentially: {}", e);
                jobs.iter().map(|job| run_node(pipeline, job)).collect()
            }
        }
    }
}

fn run_node(pipeline: &NodePipeline<'_>, job: &NodeJob) -> NodeOutcome {
    info!("Backing up node {} ({})", job.index, job.address);
    match pipeline.run(job) {
        Ok(artifact) => {
            info!(
                "Node {} ({}) backed up to {}",
                job.index,
                job.address,
                artifact.archive.display()
            );
            NodeOutcome::Succeeded(NodeSuccess {
                index: job.index,
                address: job.address.clone(),
                artifact,
            })
        }
        Err(e) => {
            error!(
                stage = e.stage(),
                "Backup of node {} ({}) failed: {}", job.index, job.address, e
            );
            NodeOutcome::Failed(NodeFailure {
                index: job.index,
                address: job.address.clone(),
                error: e,
            })
        }
    }
}
