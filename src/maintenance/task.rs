use super::last_run::LastRunFile;
use super::lock::ObjectCacheLock;
use crate::config::MaintenanceConfig;
use crate::core::{MaintenanceError, Result};
use crate::host::{GENERIC_ERROR_EXIT_CODE, HostControl};
use crate::process::{GitOutput, GitProcess, GitProcessFactory};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, info_span, warn};

/// One kind of maintenance work
///
/// Implementations only describe what to do; locking, throttling state,
/// cancellation and error escalation are handled by [`MaintenanceTask`].
pub trait MaintenanceStep: Send + Sync {
    /// Name used in logs and for the last-run file
    fn area(&self) -> &str;

    /// Do the work. Git commands must go through `task.run_git_command`.
    fn perform(&self, task: &MaintenanceTask) -> Result<()>;

    fn requires_object_cache_lock(&self) -> bool {
        true
    }

    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }
}

/// How one call to [`MaintenanceTask::execute`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Completed,
    /// Another process owns this maintenance cycle
    LockContended,
    /// `stop` was called before work started
    Stopped,
    /// Recoverable I/O failure; the task can run again next cycle
    IoFailure,
    /// Unrecoverable failure; host exit has been requested
    Fatal,
}

#[derive(Default)]
struct RunState {
    stopping: bool,
    process: Option<Arc<dyn GitProcess>>,
}

/// Runs a [`MaintenanceStep`] inside the shared scheduling envelope
pub struct MaintenanceTask {
    step: Box<dyn MaintenanceStep>,
    config: Arc<MaintenanceConfig>,
    processes: Arc<dyn GitProcessFactory>,
    host: HostControl,
    last_run: LastRunFile,
    /// `stopping` and the live process are only touched under this guard
    state: Mutex<RunState>,
}

impl MaintenanceTask {
    pub fn new(
        step: impl MaintenanceStep + 'static,
        config: Arc<MaintenanceConfig>,
        processes: Arc<dyn GitProcessFactory>,
        host: HostControl,
    ) -> Self {
        let last_run = LastRunFile::new(config.last_run_path(step.area()));

        Self {
            step: Box::new(step),
            config,
            processes,
            host,
            last_run,
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn area(&self) -> &str {
        self.step.area()
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    pub fn last_run_file(&self) -> &LastRunFile {
        &self.last_run
    }

    /// Run one maintenance cycle
    ///
    /// I/O failures are logged and end the cycle. Any other error, including
    /// a panic inside the step, is logged with full detail and turned into a
    /// host exit request with [`GENERIC_ERROR_EXIT_CODE`].
    pub fn execute(&self) -> ExecuteOutcome {
        let span = info_span!("maintenance.execute", area = %self.area());
        let _entered = span.enter();

        let result = catch_unwind(AssertUnwindSafe(|| self.run_cycle()))
            .unwrap_or_else(|panic| Err(MaintenanceError::Panicked(panic_message(panic.as_ref()))));

        self.lock_state().process = None;

        match result {
            Ok(outcome) => outcome,
            Err(err) if err.is_io() => {
                warn!(area = %self.area(), error = %err, "maintenance cycle aborted by I/O error");
                ExecuteOutcome::IoFailure
            }
            Err(err) => {
                error!(
                    area = %self.area(),
                    error = %err,
                    detail = ?err,
                    "unrecoverable error in maintenance step"
                );
                self.host
                    .request_exit(GENERIC_ERROR_EXIT_CODE, format!("{}: {}", self.area(), err));
                ExecuteOutcome::Fatal
            }
        }
    }

    fn run_cycle(&self) -> Result<ExecuteOutcome> {
        let _lock = if self.step.requires_object_cache_lock() {
            match ObjectCacheLock::try_acquire(
                &self.config.object_cache_root,
                &self.config.lock_file_name,
            )? {
                Some(lock) => Some(lock),
                None => {
                    info!(area = %self.area(), "maintenance lock held by another process, skipping");
                    return Ok(ExecuteOutcome::LockContended);
                }
            }
        } else {
            None
        };

        {
            let mut state = self.lock_state();
            if state.stopping {
                info!(area = %self.area(), "task is stopping, skipping maintenance");
                return Ok(ExecuteOutcome::Stopped);
            }
            state.process = Some(self.processes.create()?);
        }

        self.step.perform(self)?;
        Ok(ExecuteOutcome::Completed)
    }

    /// Run `work` against this cycle's git process
    ///
    /// Returns `None` without launching anything once the task is stopping.
    /// Failed commands are logged and still returned to the caller.
    pub fn run_git_command<F>(&self, work: F) -> Option<GitOutput>
    where
        F: FnOnce(&dyn GitProcess) -> GitOutput,
    {
        let process = {
            let state = self.lock_state();
            if state.stopping {
                warn!(area = %self.area(), "not launching git, task is stopping");
                return None;
            }
            match &state.process {
                Some(process) => Arc::clone(process),
                None => {
                    warn!(area = %self.area(), "no git process for this cycle");
                    return None;
                }
            }
        };

        let result = work(process.as_ref());
        if !self.is_stopping() && result.has_failures() {
            warn!(
                area = %self.area(),
                process = %process.name(),
                exit_code = ?result.exit_code,
                errors = %result.errors.trim(),
                "git command failed"
            );
        }
        Some(result)
    }

    /// Shorthand for `run_git_command(|git| git.invoke(args))`
    pub fn run_git(&self, args: &[&str]) -> Option<GitOutput> {
        self.run_git_command(|git| git.invoke(args))
    }

    /// Ask the task to stop and kill the running git process, if any
    ///
    /// Never fails; termination problems are only logged.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        state.stopping = true;

        if let Some(process) = &state.process {
            let outcome = process.try_kill();
            match &outcome.error {
                None => info!(
                    area = %self.area(),
                    process = %outcome.process_name,
                    exit_code = ?outcome.exit_code,
                    "terminated maintenance process"
                ),
                Some(err) => warn!(
                    area = %self.area(),
                    process = %outcome.process_name,
                    exit_code = ?outcome.exit_code,
                    error = %err,
                    "failed to terminate maintenance process"
                ),
            }
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.lock_state().stopping
    }

    pub fn enough_time_between_runs(&self) -> bool {
        self.last_run.enough_time_between_runs(self.step.min_interval())
    }

    pub fn save_last_run_time(&self) {
        self.last_run.save_now_or_log();
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
