//! Streaming archive extraction and creation.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Output, Stdio};

use tracing::debug;

use crate::error::ArchiveError;

/// Extracts byte streams into directories and packs directories into byte streams
pub trait Archiver: Send + Sync {
    /// Unpack `stream` into `dest`, consuming it as it arrives
    fn extract(&self, stream: &mut dyn Read, dest: &Path) -> Result<(), ArchiveError>;

    /// Start packing `source`; the archive is produced while the returned stream is read
    fn create(&self, source: &Path) -> Result<Box<dyn ArchiveStream>, ArchiveError>;
}

/// An archive being produced.
///
/// [`ArchiveStream::finish`] must be called after reading to learn whether the
/// archive is complete.
pub trait ArchiveStream: Read + Send {
    fn finish(self: Box<Self>) -> Result<(), ArchiveError>;
}

/// [`Archiver`] backed by the system `tar` binary
#[derive(Debug, Clone)]
pub struct SystemTar {
    program: String,
}

impl Default for SystemTar {
    fn default() -> Self {
        Self::new("tar")
    }
}

impl SystemTar {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_error(&self, source: io::Error) -> ArchiveError {
        ArchiveError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl Archiver for SystemTar {
    fn extract(&self, stream: &mut dyn Read, dest: &Path) -> Result<(), ArchiveError> {
        debug!("Extracting archive stream into {}", dest.display());

        let mut child = Command::new(&self.program)
            .arg("-xf")
            .arg("-")
            .arg("-C")
            .arg(dest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // stdin is closed at the end of this block so tar sees EOF
        let copied = match child.stdin.take() {
            Some(mut stdin) => io::copy(stream, &mut stdin).map(|_| ()),
            None => Ok(()),
        };

        let output = child.wait_with_output()?;

        match copied {
            // a failing source is the root cause even if tar complains about truncation
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(ArchiveError::Io(e)),
            copied => {
                check_status(&self.program, output)?;
                copied.map_err(ArchiveError::Io)
            }
        }
    }

    fn create(&self, source: &Path) -> Result<Box<dyn ArchiveStream>, ArchiveError> {
        debug!("Packing {} into archive stream", source.display());

        let mut child = Command::new(&self.program)
            .arg("-cf")
            .arg("-")
            .arg("-C")
            .arg(source)
            .arg(".")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ArchiveError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "tar output was not captured",
                )));
            }
        };

        Ok(Box::new(TarStream {
            program: self.program.clone(),
            child: Some(child),
            stdout: Some(stdout),
        }))
    }
}

struct TarStream {
    program: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl Read for TarStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl ArchiveStream for TarStream {
    fn finish(mut self: Box<Self>) -> Result<(), ArchiveError> {
        // closing our end first lets tar exit if the reader stopped early
        self.stdout.take();
        match self.child.take() {
            Some(child) => check_status(&self.program, child.wait_with_output()?),
            None => Ok(()),
        }
    }
}

impl Drop for TarStream {
    fn drop(&mut self) {
        self.stdout.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn check_status(program: &str, output: Output) -> Result<(), ArchiveError> {
    if output.status.success() {
        return Ok(());
    }
    Err(ArchiveError::Failed {
        program: program.to_string(),
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
