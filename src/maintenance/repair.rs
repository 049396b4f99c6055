//! Auto-repair of corrupt auxiliary git artifacts.
//!
//! When verification of a derived file (multi-pack-index, commit-graph) fails,
//! the file is deleted and regenerated, and the whole episode is reported as a
//! single error event so the before and after state can be read together.

use super::task::MaintenanceTask;
use crate::process::{GitOutput, GitProcess};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::error;

/// What happened to the corrupt artifact on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    Missing,
    Failed(String),
}

impl fmt::Display for DeleteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => write!(f, "deleted"),
            Self::Missing => write!(f, "missing"),
            Self::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub artifact: String,
    pub path: PathBuf,
    pub verify_output: String,
    pub verify_errors: String,
    pub delete_result: DeleteResult,
    /// `None` when the rewrite did not run or produced no exit code
    pub rewrite_exit_code: Option<i32>,
    pub rewrite_ran: bool,
}

impl RepairReport {
    pub fn repaired(&self) -> bool {
        self.rewrite_exit_code == Some(0)
    }
}

impl MaintenanceTask {
    /// Delete a corrupt artifact and regenerate it with `rewrite`
    ///
    /// `rewrite` goes through [`run_git_command`](Self::run_git_command), so
    /// a stopping task deletes the file but does not regenerate it.
    pub fn repair_artifact<F>(
        &self,
        artifact: &str,
        path: &Path,
        verify: &GitOutput,
        rewrite: F,
    ) -> RepairReport
    where
        F: FnOnce(&dyn GitProcess) -> GitOutput,
    {
        let delete_result = delete_artifact(path);
        let rewrite = self.run_git_command(rewrite);

        let report = RepairReport {
            artifact: artifact.to_string(),
            path: path.to_path_buf(),
            verify_output: verify.output.clone(),
            verify_errors: verify.errors.clone(),
            delete_result,
            rewrite_exit_code: rewrite.as_ref().and_then(|output| output.exit_code),
            rewrite_ran: rewrite.is_some(),
        };

        error!(
            area = %self.area(),
            artifact = %report.artifact,
            path = %report.path.display(),
            verify_output = %report.verify_output.trim(),
            verify_errors = %report.verify_errors.trim(),
            delete_result = %report.delete_result,
            rewrite_exit_code = ?report.rewrite_exit_code,
            "auto-repair of corrupt {}",
            artifact
        );

        report
    }
}

fn delete_artifact(path: &Path) -> DeleteResult {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => DeleteResult::Deleted,
        Err(err) if err.kind() == io::ErrorKind::NotFound => DeleteResult::Missing,
        Err(err) => DeleteResult::Failed(err.to_string()),
    }
}
