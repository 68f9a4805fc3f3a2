//! Fixtures and collaborator fakes shared by the unit tests.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::archive::{Archiver, SystemTar};
use crate::config::{Config, SymmetricKey};
use crate::download::{Downloader, StreamedWriter};
use crate::error::DownloadError;
use crate::prepare::BackupPreparer;

pub const FIXTURE_INFO: &str = "\
uuid = 0f3b2a9e-5d4c-11e6-8b77-86f30ca893d3
name =
tool_name = xtrabackup
tool_command = --backup --stream=tar
tool_version = 2.4.4
ibbackup_version = 2.4.4
server_version = 5.7.13-log
";

/// A tar stream that looks like a streamed xtrabackup
pub fn fixture_stream() -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("xtrabackup_info"), FIXTURE_INFO).unwrap();
    fs::create_dir_all(dir.path().join("mysql")).unwrap();
    fs::write(dir.path().join("mysql/user.frm"), b"frm contents").unwrap();
    let ibdata: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
    fs::write(dir.path().join("ibdata1"), ibdata).unwrap();

    let mut stream = SystemTar::default().create(dir.path()).unwrap();
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();
    stream.finish().unwrap();
    bytes
}

/// Configuration rooted in a scratch directory; the output directory is created
pub fn test_config(root: &Path, nodes: &[&str]) -> Config {
    let output_dir = root.join("output");
    fs::create_dir_all(&output_dir).unwrap();

    let mut config = Config {
        nodes: nodes.iter().map(|n| n.to_string()).collect(),
        staging_dir: root.join("staging"),
        output_dir,
        symmetric_key: SymmetricKey::new("hello"),
        encryption: cfg!(feature = "encryption"),
        ..Config::default()
    };
    config
        .metadata_fields
        .insert("compressed".to_string(), "Y".to_string());
    config
        .metadata_fields
        .insert("encrypted".to_string(), "Y".to_string());
    config
}

/// Number of directory entries, zero when the directory does not exist
pub fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Files in `dir` named `<prefix>-*<suffix>`
pub fn matching_files(dir: &Path, prefix: &str, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(&format!("{}-", prefix)) && name.ends_with(suffix))
        .collect();
    names.sort();
    names
}

/// Serves the same backup stream for every address, except the failing ones
pub struct FakeDownloader {
    payload: Vec<u8>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Downloader for FakeDownloader {
    fn download_backup(
        &self,
        address: &str,
        sink: &mut dyn StreamedWriter,
    ) -> Result<(), DownloadError> {
        self.calls.lock().unwrap().push(address.to_string());
        if self.failing.contains(address) {
            return Err(DownloadError::Status {
                url: address.to_string(),
                status: 503,
            });
        }
        sink.write_stream(&mut self.payload.as_slice())?;
        Ok(())
    }
}

/// Returns `true` for healthy nodes and `false` for the failing ones
pub struct FakePreparer {
    failing: HashSet<usize>,
    calls: AtomicUsize,
    indices: Mutex<Vec<usize>>,
}

impl FakePreparer {
    pub fn succeeding() -> Self {
        Self::failing_nodes(&[])
    }

    pub fn failing_nodes(indices: &[usize]) -> Self {
        Self {
            failing: indices.iter().copied().collect(),
            calls: AtomicUsize::new(0),
            indices: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn indices(&self) -> Vec<usize> {
        self.indices.lock().unwrap().clone()
    }
}

impl BackupPreparer for FakePreparer {
    fn command(&self, node_index: usize, backup_dir: &Path) -> Command {
        assert!(backup_dir.is_dir(), "preparer must get an existing staging dir");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.indices.lock().unwrap().push(node_index);

        if self.failing.contains(&node_index) {
            Command::new("false")
        } else {
            Command::new("true")
        }
    }
}
