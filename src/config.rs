//! Run configuration loaded from a TOML file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::ConfigError;
use crate::metadata::FIXED_KEYS;

/// Environment variable that overrides the symmetric key from the config file
pub const SYMMETRIC_KEY_ENV: &str = "STREAMING_BACKUP_SYMMETRIC_KEY";

/// Default prefix of artifact file names
pub const DEFAULT_ARTIFACT_PREFIX: &str = "mysql-backup";

/// Secret used to encrypt artifacts.
///
/// Never printed, never serialized, wiped from memory on drop.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SymmetricKey(String);

impl SymmetricKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// How node addresses are turned into backup URLs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupServerConfig {
    pub port: u16,
    pub path: String,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Extra PEM certificate trusted for TLS connections
    pub ca_cert: Option<PathBuf>,
    /// Upper bound for a whole download, `None` waits indefinitely
    pub timeout_secs: Option<u64>,
}

impl Default for BackupServerConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            path: "/backup".to_string(),
            tls: true,
            username: None,
            password: None,
            ca_cert: None,
            timeout_secs: None,
        }
    }
}

impl BackupServerConfig {
    /// Backup URL for a node address. Addresses carrying a scheme are used verbatim.
    pub fn backup_url(&self, address: &str) -> String {
        if address.contains("://") {
            return address.to_string();
        }
        let scheme = if self.tls { "https" } else { "http" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", scheme, address, self.port, path)
    }
}

/// External preparation tool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreparerConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("xtrabackup"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node addresses, in the order they are backed up
    pub nodes: Vec<String>,
    /// Root under which per-node staging directories are created
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub symmetric_key: SymmetricKey,
    pub encryption: bool,
    pub metadata_fields: BTreeMap<String, String>,
    pub artifact_prefix: String,
    /// Number of nodes processed at the same time
    pub parallelism: usize,
    pub backup_server: BackupServerConfig,
    pub preparer: PreparerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            staging_dir: std::env::temp_dir(),
            output_dir: PathBuf::from("."),
            symmetric_key: SymmetricKey::default(),
            encryption: true,
            metadata_fields: BTreeMap::new(),
            artifact_prefix: DEFAULT_ARTIFACT_PREFIX.to_string(),
            parallelism: 1,
            backup_server: BackupServerConfig::default(),
            preparer: PreparerConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a config file, applying the key override from the environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml(&content)?;
        if let Ok(key) = std::env::var(SYMMETRIC_KEY_ENV) {
            debug!("Using symmetric key from {}", SYMMETRIC_KEY_ENV);
            config.symmetric_key = SymmetricKey::new(key);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a config document without validating it
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check the invariants the orchestrator relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(invalid("at least one node address is required"));
        }
        if self.nodes.iter().any(|node| node.trim().is_empty()) {
            return Err(invalid("node addresses must not be empty"));
        }
        if self.encryption && self.symmetric_key.is_empty() {
            return Err(invalid("symmetric_key must be set when encryption is enabled"));
        }
        if self.parallelism == 0 {
            return Err(invalid("parallelism must be at least 1"));
        }
        if self.artifact_prefix.is_empty()
            || self.artifact_prefix.contains(['/', '\\'])
            || self.artifact_prefix.starts_with('.')
        {
            return Err(invalid(
                "artifact_prefix must be a non-empty file name prefix not starting with '.'",
            ));
        }

        for (key, value) in &self.metadata_fields {
            if key.trim().is_empty() || key.contains(['=', '\n', '\r']) {
                return Err(invalid(format!("invalid metadata field name {:?}", key)));
            }
            if FIXED_KEYS.contains(&key.as_str()) {
                return Err(invalid(format!(
                    "metadata field {:?} would shadow a built-in metadata key",
                    key
                )));
            }
            if value.contains(['\n', '\r']) {
                return Err(invalid(format!(
                    "metadata field {:?} must be a single line",
                    key
                )));
            }
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}
