//! Companion metadata files for backup artifacts.
//!
//! The metadata file is plain UTF-8 text with one `key = value` assignment per
//! line. Built-in keys come first, in [`FIXED_KEYS`] order, followed by the
//! custom fields from the configuration sorted by name.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;

/// Keys present in every metadata file
pub const FIXED_KEYS: [&str; 9] = [
    "uuid",
    "name",
    "tool_name",
    "tool_command",
    "tool_version",
    "ibbackup_version",
    "server_version",
    "start_time",
    "end_time",
];

/// File written into the backup directory by the preparation tool
pub const BACKUP_INFO_FILE: &str = "xtrabackup_info";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Key/value pairs reported by the preparation tool about a backup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupInfo {
    values: BTreeMap<String, String>,
}

impl BackupInfo {
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { values }
    }

    /// Read [`BACKUP_INFO_FILE`] from a backup directory; a missing file yields no values
    pub fn read_from(backup_dir: &Path) -> io::Result<Self> {
        match fs::read_to_string(backup_dir.join(BACKUP_INFO_FILE)) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// What the metadata builder needs to know about a finished node job
#[derive(Debug, Clone)]
pub struct CompletedJob<'a> {
    pub uuid: Uuid,
    /// Identifier shared by the archive and metadata file names
    pub artifact_id: &'a str,
    pub info: &'a BackupInfo,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

/// Ordered metadata record of one artifact
#[derive(Debug, Clone, PartialEq)]
pub struct BackupMetadata {
    entries: Vec<(String, String)>,
}

impl BackupMetadata {
    /// Assemble the fixed and custom fields for a completed job
    pub fn build(job: &CompletedJob<'_>, config: &Config) -> Self {
        let info_value = |key: &str| job.info.get(key).unwrap_or_default().to_string();

        let name = match job.info.get("name") {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => job.artifact_id.to_string(),
        };

        let mut entries = vec![
            ("uuid".to_string(), job.uuid.to_string()),
            ("name".to_string(), name),
            ("tool_name".to_string(), info_value("tool_name")),
            ("tool_command".to_string(), info_value("tool_command")),
            ("tool_version".to_string(), info_value("tool_version")),
            ("ibbackup_version".to_string(), info_value("ibbackup_version")),
            ("server_version".to_string(), info_value("server_version")),
            (
                "start_time".to_string(),
                job.started.format(TIME_FORMAT).to_string(),
            ),
            (
                "end_time".to_string(),
                job.finished.format(TIME_FORMAT).to_string(),
            ),
        ];

        entries.extend(
            config
                .metadata_fields
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Serialize as `key = value` lines
    pub fn render(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.entries {
            text.push_str(key);
            text.push_str(" = ");
            text.push_str(value);
            text.push('\n');
        }
        text
    }
}
