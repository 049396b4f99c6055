pub mod command;

use crate::core::Result;
use std::fmt;
use std::sync::Arc;

pub use command::{CommandGitProcess, CommandGitProcessFactory};

/// Result of one external git invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    /// `None` when the process could not be launched or was killed by a signal
    pub exit_code: Option<i32>,
    pub output: String,
    pub errors: String,
}

impl GitOutput {
    pub fn new(exit_code: Option<i32>, output: impl Into<String>, errors: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            errors: errors.into(),
        }
    }

    pub fn success(output: impl Into<String>) -> Self {
        Self::new(Some(0), output, "")
    }

    pub fn failed(exit_code: i32, errors: impl Into<String>) -> Self {
        Self::new(Some(exit_code), "", errors)
    }

    pub fn launch_failed(errors: impl Into<String>) -> Self {
        Self::new(None, "", errors)
    }

    pub fn has_failures(&self) -> bool {
        self.exit_code != Some(0)
    }
}

impl fmt::Display for GitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "exit code {}", code)?,
            None => write!(f, "no exit code")?,
        }
        if !self.errors.trim().is_empty() {
            write!(f, ": {}", self.errors.trim())?;
        }
        Ok(())
    }
}

/// Outcome of a best-effort termination request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillOutcome {
    pub process_name: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl KillOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Handle to the external git tool for one maintenance cycle
///
/// `invoke` blocks the calling thread until the command finishes.
/// `try_kill` may be called from any other thread at any time and must
/// never panic; once it has been called the handle should refuse to launch
/// anything new.
pub trait GitProcess: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, args: &[&str]) -> GitOutput;

    fn try_kill(&self) -> KillOutcome;
}

/// Creates a fresh [`GitProcess`] at the start of every maintenance cycle
pub trait GitProcessFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn GitProcess>>;
}
