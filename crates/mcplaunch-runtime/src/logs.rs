//! Per-run backend log file.
//!
//! The backend's stdout and stderr are redirected straight into this file so
//! nothing it prints can reach the stream the proxy speaks on. The file is
//! named after the launcher's own PID, truncated at session start and left on
//! disk afterwards for diagnosis.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use mcplaunch_core::LaunchError;
use tracing::debug;

/// File name prefix for session logs.
pub const LOG_FILE_PREFIX: &str = "mcplaunch-backend";

/// Upper bound on how much log output is quoted back in startup errors.
const MAX_CAPTURED_BYTES: usize = 64 * 1024;

/// Path of the session log for launcher process `pid` inside `dir`.
pub fn session_log_path(dir: &Path, pid: u32) -> PathBuf {
    dir.join(format!("{LOG_FILE_PREFIX}-{pid}.log"))
}

/// Open log file capturing backend output for one session.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    file: Option<File>,
}

impl SessionLog {
    /// Create the log for the current process in `dir`.
    pub fn create(dir: &Path) -> Result<Self, LaunchError> {
        Self::create_for_pid(dir, std::process::id())
    }

    /// Create (or truncate) the log for launcher process `pid` in `dir`.
    pub fn create_for_pid(dir: &Path, pid: u32) -> Result<Self, LaunchError> {
        let path = session_log_path(dir, pid);
        let to_error = |source| LaunchError::LogSink {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(to_error)?;
        let file = File::create(&path).map_err(to_error)?;

        debug!(path = %path.display(), "Created session log");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the launcher still holds the file open.
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Fresh stdout/stderr handles pointing at the log, for a child process.
    pub fn stdio(&self) -> io::Result<(Stdio, Stdio)> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "session log is closed"))?;
        Ok((
            Stdio::from(file.try_clone()?),
            Stdio::from(file.try_clone()?),
        ))
    }

    /// Flush and release the launcher's handle.
    ///
    /// Returns `Ok(false)` if the log was already closed. Children keep their
    /// own descriptors, so a still-running backend can continue writing.
    pub fn close(&mut self) -> io::Result<bool> {
        match self.file.take() {
            Some(mut file) => {
                file.flush()?;
                debug!(path = %self.path.display(), "Closed session log");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read back what has been written so far, keeping only the trailing
    /// 64 KiB.
    pub fn read_tail(&self) -> Result<String, LaunchError> {
        let bytes = fs::read(&self.path).map_err(|source| LaunchError::LogSink {
            path: self.path.clone(),
            source,
        })?;
        let start = bytes.len().saturating_sub(MAX_CAPTURED_BYTES);
        Ok(String::from_utf8_lossy(&bytes[start..])
            .trim_end()
            .to_string())
    }
}
