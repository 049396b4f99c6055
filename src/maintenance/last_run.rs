//! Last successful run timestamp for one maintenance step.
//!
//! The file holds a single decimal Unix timestamp in seconds. Reads fail open:
//! a missing or unreadable file means the step is eligible to run.

use chrono::Utc;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct LastRunFile {
    path: PathBuf,
}

impl LastRunFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored timestamp
    ///
    /// `Ok(None)` when no run has been recorded yet.
    pub fn read(&self) -> io::Result<Option<i64>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        contents.trim().parse::<i64>().map(Some).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid timestamp {:?}: {}", contents.trim(), err),
            )
        })
    }

    /// True when at least `min_interval` has passed since the recorded run
    pub fn enough_time_between_runs(&self, min_interval: Duration) -> bool {
        let last_run = match self.read() {
            Ok(Some(last_run)) => last_run,
            Ok(None) => return true,
            Err(err) => {
                error!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read last run time, treating step as due"
                );
                return true;
            }
        };

        let elapsed = Utc::now().timestamp().saturating_sub(last_run);
        let min_secs = i64::try_from(min_interval.as_secs()).unwrap_or(i64::MAX);
        elapsed >= min_secs
    }

    /// Record the current time, replacing the previous value atomically
    pub fn save_now(&self) -> io::Result<()> {
        self.write_timestamp(Utc::now().timestamp())
    }

    pub fn write_timestamp(&self, timestamp: i64) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(timestamp.to_string().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    /// Like [`save_now`](Self::save_now) but only logs failures
    pub fn save_now_or_log(&self) {
        if let Err(err) = self.save_now() {
            warn!(
                path = %self.path.display(),
                error = %err,
                "failed to save last run time"
            );
        }
    }
}
