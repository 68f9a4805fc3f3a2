//! Artifact naming and promotion into the output directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Suffix of metadata files
pub const METADATA_SUFFIX: &str = ".txt";

const PARTIAL_SUFFIX: &str = ".partial";

/// File names of one artifact pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    id: String,
    archive_suffix: &'static str,
}

impl ArtifactNames {
    /// `<prefix>-<run stamp>-<node index>-<first 8 hex digits of uuid>`
    pub fn new(
        prefix: &str,
        run_stamp: &str,
        node_index: usize,
        uuid: &Uuid,
        archive_suffix: &'static str,
    ) -> Self {
        let short = uuid.simple().to_string();
        Self {
            id: format!("{}-{}-{}-{}", prefix, run_stamp, node_index, &short[..8]),
            archive_suffix,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn archive_file(&self) -> String {
        format!("{}{}", self.id, self.archive_suffix)
    }

    pub fn metadata_file(&self) -> String {
        format!("{}{}", self.id, METADATA_SUFFIX)
    }
}

/// Paths of a promoted artifact pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedFiles {
    pub archive: PathBuf,
    pub metadata: PathBuf,
}

/// Temporary artifact files waiting for promotion.
///
/// Temporaries are hidden dot-files, so they never match the artifact globs.
/// Whatever has not been promoted is deleted on drop.
#[derive(Debug)]
pub struct PendingArtifact {
    archive_tmp: PathBuf,
    metadata_tmp: PathBuf,
    archive_final: PathBuf,
    metadata_final: PathBuf,
    promoted: bool,
}

impl PendingArtifact {
    pub fn new(output_dir: &Path, names: &ArtifactNames) -> Self {
        let hidden = |file: String| output_dir.join(format!(".{}{}", file, PARTIAL_SUFFIX));
        Self {
            archive_tmp: hidden(names.archive_file()),
            metadata_tmp: hidden(names.metadata_file()),
            archive_final: output_dir.join(names.archive_file()),
            metadata_final: output_dir.join(names.metadata_file()),
            promoted: false,
        }
    }

    pub fn archive_tmp(&self) -> &Path {
        &self.archive_tmp
    }

    pub fn metadata_tmp(&self) -> &Path {
        &self.metadata_tmp
    }

    /// Rename both temporaries to their final names.
    ///
    /// If the metadata rename fails the already promoted archive is removed
    /// again, so either both files become visible or neither does.
    pub fn promote(mut self) -> io::Result<PromotedFiles> {
        for target in [&self.archive_final, &self.metadata_final] {
            if target.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", target.display()),
                ));
            }
        }

        fs::rename(&self.archive_tmp, &self.archive_final)?;
        if let Err(e) = fs::rename(&self.metadata_tmp, &self.metadata_final) {
            if let Err(cleanup) = fs::remove_file(&self.archive_final) {
                warn!(
                    "Failed to roll back {}: {}",
                    self.archive_final.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        self.promoted = true;
        debug!("Promoted {}", self.archive_final.display());
        Ok(PromotedFiles {
            archive: self.archive_final.clone(),
            metadata: self.metadata_final.clone(),
        })
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if self.promoted {
            return;
        }
        for tmp in [&self.archive_tmp, &self.metadata_tmp] {
            match fs::remove_file(tmp) {
                Ok(()) => debug!("Removed {}", tmp.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", tmp.display(), e),
            }
        }
    }
}

/// Write `contents` to `path` and flush it to disk
pub fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names() -> ArtifactNames {
        let uuid = Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000000").unwrap();
        ArtifactNames::new("mysql-backup", "20261016T120000Z", 2, &uuid, ".tar.age")
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_names_share_identifier() {
        let names = names();
        assert_eq!(names.id(), "mysql-backup-20261016T120000Z-2-1a2b3c4d");
        assert_eq!(
            names.archive_file(),
            "mysql-backup-20261016T120000Z-2-1a2b3c4d.tar.age"
        );
        assert_eq!(
            names.metadata_file(),
            "mysql-backup-20261016T120000Z-2-1a2b3c4d.txt"
        );
    }

    #[test]
    fn test_promote_moves_both_files() {
        let out = TempDir::new().unwrap();
        let pending = PendingArtifact::new(out.path(), &names());
        write_synced(pending.archive_tmp(), b"archive").unwrap();
        write_synced(pending.metadata_tmp(), b"uuid = x\n").unwrap();

        let promoted = pending.promote().unwrap();

        assert_eq!(fs::read(&promoted.archive).unwrap(), b"archive");
        assert_eq!(fs::read(&promoted.metadata).unwrap(), b"uuid = x\n");
        assert_eq!(
            entries(out.path()),
            vec![
                "mysql-backup-20261016T120000Z-2-1a2b3c4d.tar.age",
                "mysql-backup-20261016T120000Z-2-1a2b3c4d.txt",
            ]
        );
    }

    #[test]
    fn test_drop_removes_temporaries() {
        let out = TempDir::new().unwrap();
        {
            let pending = PendingArtifact::new(out.path(), &names());
            write_synced(pending.archive_tmp(), b"half an archive").unwrap();
        }
        assert!(entries(out.path()).is_empty());
    }

    #[test]
    fn test_failed_metadata_promotion_rolls_back_archive() {
        let out = TempDir::new().unwrap();
        let pending = PendingArtifact::new(out.path(), &names());
        write_synced(pending.archive_tmp(), b"archive").unwrap();
        // metadata temporary was never written, so its rename fails

        assert!(pending.promote().is_err());
        assert!(entries(out.path()).is_empty());
    }

    #[test]
    fn test_promote_refuses_to_overwrite() {
        let out = TempDir::new().unwrap();
        let names = names();
        fs::write(out.path().join(names.archive_file()), b"older").unwrap();

        let pending = PendingArtifact::new(out.path(), &names);
        write_synced(pending.archive_tmp(), b"archive").unwrap();
        write_synced(pending.metadata_tmp(), b"uuid = x\n").unwrap();

        let err = pending.promote().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(
            fs::read(out.path().join(names.archive_file())).unwrap(),
            b"older"
        );
        assert_eq!(
            entries(out.path()),
            vec!["mysql-backup-20261016T120000Z-2-1a2b3c4d.tar.age"]
        );
    }
}
