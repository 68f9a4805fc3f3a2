//! JSON summary of a backup run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::orchestrator::{AggregateResult, NodeOutcome};
use super::pipeline::StagedSize;

/// Summary of a whole run, one entry per configured node
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub success: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub nodes: Vec<NodeReport>,
}

/// Per-node part of a [`RunReport`]
#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub index: usize,
    pub address: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared: Option<StagedSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Succeeded,
    Failed,
}

impl RunReport {
    pub fn from_result(result: &AggregateResult) -> Self {
        let nodes: Vec<NodeReport> = result.outcomes().iter().map(NodeReport::from_outcome).collect();
        let succeeded = result.success_count();

        Self {
            generated_at: Utc::now(),
            success: result.is_success(),
            succeeded,
            failed: nodes.len() - succeeded,
            nodes,
        }
    }

    /// Write the report as pretty JSON, replacing `path` atomically
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path).with_context(|| format!("writing report {}", path.display()))?;
        Ok(())
    }
}

impl NodeReport {
    fn from_outcome(outcome: &NodeOutcome) -> Self {
        match outcome {
            NodeOutcome::Succeeded(success) => Self {
                index: success.index,
                address: success.address.clone(),
                status: NodeStatus::Succeeded,
                archive: Some(success.artifact.archive.clone()),
                metadata: Some(success.artifact.metadata.clone()),
                started: Some(success.artifact.started),
                finished: Some(success.artifact.finished),
                prepared: Some(success.artifact.prepared),
                stage: None,
                error: None,
            },
            NodeOutcome::Failed(failure) => Self {
                index: failure.index,
                address: failure.address.clone(),
                status: NodeStatus::Failed,
                archive: None,
                metadata: None,
                started: None,
                finished: None,
                prepared: None,
                stage: Some(failure.error.stage()),
                error: Some(failure.error.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::orchestrator::NodeSuccess;
    use crate::backup::pipeline::NodeArtifact;
    use crate::error::{DownloadError, NodeError, NodeFailure};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn mixed_result() -> AggregateResult {
        let now = Utc::now();
        AggregateResult::new(vec![
            NodeOutcome::Failed(NodeFailure {
                index: 0,
                address: "node1".to_string(),
                error: NodeError::Download(DownloadError::Status {
                    url: "https://node1:8081/backup".to_string(),
                    status: 503,
                }),
            }),
            NodeOutcome::Succeeded(NodeSuccess {
                index: 1,
                address: "node2".to_string(),
                artifact: NodeArtifact {
                    uuid: Uuid::new_v4(),
                    archive: PathBuf::from("/out/mysql-backup-a.tar.age"),
                    metadata: PathBuf::from("/out/mysql-backup-a.txt"),
                    started: now,
                    finished: now,
                    prepared: StagedSize {
                        files: 3,
                        bytes: 4096,
                    },
                },
            }),
        ])
    }

    #[test]
    fn test_report_from_mixed_result() {
        let report = RunReport::from_result(&mixed_result());

        assert!(report.success);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.nodes[0].status, NodeStatus::Failed);
        assert_eq!(report.nodes[0].stage, Some("download"));
        assert!(report.nodes[0].error.as_deref().unwrap().contains("503"));
        assert_eq!(report.nodes[1].status, NodeStatus::Succeeded);
        assert_eq!(report.nodes[1].prepared.unwrap().bytes, 4096);
    }

    #[test]
    fn test_report_written_as_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("run.json");

        RunReport::from_result(&mixed_result()).write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["succeeded"], 1);
        assert_eq!(value["nodes"][0]["status"], "failed");
        assert_eq!(value["nodes"][1]["status"], "succeeded");
        assert_eq!(value["nodes"][1]["prepared"]["files"], 3);
        assert!(value["nodes"][1].get("error").is_none());
        assert!(!dir.path().join("reports").join("run.json.tmp").exists());
    }
}
