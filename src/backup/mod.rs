//! Backup engine: per-node pipelines, artifact promotion and multi-node orchestration.
//!
//! Each configured node runs through a [`NodePipeline`] that streams, prepares,
//! archives and encrypts its backup into an artifact pair. The [`Orchestrator`]
//! runs every node and applies the partial-success policy.

pub mod artifact;
pub mod orchestrator;
pub mod pipeline;
pub mod report;

pub use artifact::{ArtifactNames, PendingArtifact, PromotedFiles, METADATA_SUFFIX};
pub use orchestrator::{AggregateResult, NodeOutcome, NodeSuccess, Orchestrator};
pub use pipeline::{Collaborators, JobStage, NodeArtifact, NodeJob, NodePipeline, StagedSize};
pub use report::{NodeReport, NodeStatus, RunReport};
