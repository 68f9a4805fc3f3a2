//! Fetching raw backup streams from cluster nodes.

use std::fs;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::config::BackupServerConfig;
use crate::error::{ArchiveError, DownloadError};

/// Destination of a backup stream; consumes the stream as it arrives
pub trait StreamedWriter {
    fn write_stream(&mut self, stream: &mut dyn Read) -> Result<(), ArchiveError>;
}

/// Streams a node's raw backup into a [`StreamedWriter`]
pub trait Downloader: Send + Sync {
    fn download_backup(
        &self,
        address: &str,
        sink: &mut dyn StreamedWriter,
    ) -> Result<(), DownloadError>;
}

impl<T: Downloader + ?Sized> Downloader for Arc<T> {
    fn download_backup(
        &self,
        address: &str,
        sink: &mut dyn StreamedWriter,
    ) -> Result<(), DownloadError> {
        (**self).download_backup(address, sink)
    }
}

/// Downloads backups from the HTTP backup endpoint running on every node
pub struct HttpDownloader {
    client: Client,
    server: BackupServerConfig,
}

impl HttpDownloader {
    pub fn from_config(server: &BackupServerConfig) -> Result<Self, DownloadError> {
        // nodes are reached directly on the cluster network
        let mut builder = Client::builder()
            .no_proxy()
            .timeout(server.timeout_secs.map(Duration::from_secs));

        if let Some(ca_path) = &server.ca_cert {
            let pem = fs::read(ca_path).map_err(|e| {
                DownloadError::Client(format!(
                    "failed to read CA certificate {}: {}",
                    ca_path.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| DownloadError::Client(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        Ok(Self {
            client,
            server: server.clone(),
        })
    }
}

impl Downloader for HttpDownloader {
    fn download_backup(
        &self,
        address: &str,
        sink: &mut dyn StreamedWriter,
    ) -> Result<(), DownloadError> {
        let url = self.server.backup_url(address);
        info!("Requesting backup stream from {}", url);

        let mut request = self.client.get(&url);
        if let Some(username) = &self.server.username {
            request = request.basic_auth(username, self.server.password.as_ref());
        }

        let mut response = request.send().map_err(|source| DownloadError::Request {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url,
                status: status.as_u16(),
            });
        }

        debug!("Streaming backup from {} ({})", url, status);
        sink.write_stream(&mut response)?;
        Ok(())
    }
}
