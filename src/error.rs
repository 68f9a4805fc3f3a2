//! Error types for the streaming backup client.
//!
//! Every stage of a node job has its own error type so that a failure can be
//! attributed to exactly one stage. [`NodeError`] wraps those per node, and
//! [`AggregateError`] collects the node errors of a run in which no node
//! produced an artifact.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Configuration could not be loaded or is inconsistent
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// The backup stream of a node could not be fetched
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("stream extraction failed: {0}")]
    Extract(#[from] ArchiveError),
}

/// The external preparation command did not succeed
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Archive extraction or creation failed
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Encryption or decryption of an artifact stream failed
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("encryption I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decrypt artifact: {reason}")]
    Decrypt { reason: String },

    #[error("encryption support is not compiled in")]
    Unavailable,
}

/// The default collaborators could not be built from the configuration
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

/// Failure of a single node job, tagged by the stage that failed
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("failed to set up staging directory: {0}")]
    Staging(#[source] std::io::Error),

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("backup preparation failed: {0}")]
    Preparation(#[from] PrepareError),

    #[error("archiving failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("failed to write metadata: {0}")]
    MetadataWrite(#[source] std::io::Error),

    #[error("failed to promote artifact: {0}")]
    Promotion(#[source] std::io::Error),
}

impl NodeError {
    /// Short name of the stage this error belongs to
    pub fn stage(&self) -> &'static str {
        match self {
            NodeError::Staging(_) => "staging",
            NodeError::Download(_) => "download",
            NodeError::Preparation(_) => "preparation",
            NodeError::Archive(_) => "archive",
            NodeError::Encryption(_) => "encryption",
            NodeError::MetadataWrite(_) => "metadata",
            NodeError::Promotion(_) => "promotion",
        }
    }
}

/// A node error together with the identity of the node it belongs to
#[derive(Debug)]
pub struct NodeFailure {
    pub index: usize,
    pub address: String,
    pub error: NodeError,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} ({}): {}", self.index, self.address, self.error)
    }
}

/// Returned when every node of a run failed
#[derive(Debug)]
pub struct AggregateError {
    failures: Vec<NodeFailure>,
}

impl AggregateError {
    pub fn new(failures: Vec<NodeFailure>) -> Self {
        Self { failures }
    }

    /// Number of node errors carried
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeFailure> {
        self.failures.iter()
    }

    pub fn into_failures(self) -> Vec<NodeFailure> {
        self.failures
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "multiple errors:")?;
        for failure in &self.failures {
            write!(f, "\n  * {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare_failure(index: usize) -> NodeFailure {
        NodeFailure {
            index,
            address: format!("node{}", index + 1),
            error: NodeError::Preparation(PrepareError::Spawn {
                program: "xtrabackup".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
        }
    }

    #[test]
    fn test_aggregate_error_lists_every_failure() {
        let err = AggregateError::new(vec![prepare_failure(0), prepare_failure(1)]);
        let text = err.to_string();

        assert_eq!(err.len(), 2);
        assert!(text.starts_with("multiple errors:"));
        assert!(text.contains("node 0 (node1): backup preparation failed"));
        assert!(text.contains("node 1 (node2): backup preparation failed"));
    }

    #[test]
    fn test_node_error_stage() {
        let err = NodeError::Promotion(std::io::Error::new(std::io::ErrorKind::Other, "busy"));
        assert_eq!(err.stage(), "promotion");
        assert_eq!(prepare_failure(0).error.stage(), "preparation");
    }
}
