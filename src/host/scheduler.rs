use super::{ExitRequest, HostControl};
use crate::core::{MaintenanceError, Result};
use crate::maintenance::{ExecuteOutcome, MaintenanceTask};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// A task and the cadence at which it is offered a maintenance cycle
#[derive(Clone)]
pub struct ScheduledTask {
    pub task: Arc<MaintenanceTask>,
    pub interval: Duration,
    pub initial_delay: Duration,
}

/// Periodically drives maintenance tasks on the blocking thread pool
pub struct MaintenanceScheduler {
    tasks: Vec<ScheduledTask>,
    host: HostControl,
}

impl MaintenanceScheduler {
    pub fn new(host: HostControl) -> Self {
        Self {
            tasks: Vec::new(),
            host,
        }
    }

    /// Schedule `task` every `interval`, first run after one interval
    pub fn add(self, task: Arc<MaintenanceTask>, interval: Duration) -> Self {
        self.add_with_delay(task, interval, interval)
    }

    pub fn add_with_delay(
        mut self,
        task: Arc<MaintenanceTask>,
        interval: Duration,
        initial_delay: Duration,
    ) -> Self {
        self.tasks.push(ScheduledTask {
            task,
            interval,
            initial_delay,
        });
        self
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    /// Run every task once, in order, and report the outcomes
    ///
    /// Stops early if a task requests host exit.
    pub async fn run_once(&self) -> Result<Vec<(String, ExecuteOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());

        for scheduled in &self.tasks {
            let outcome = execute_blocking(Arc::clone(&scheduled.task)).await?;
            outcomes.push((scheduled.task.area().to_string(), outcome));
            if outcome == ExecuteOutcome::Fatal {
                break;
            }
        }

        Ok(outcomes)
    }

    /// Spawn one driver loop per task. Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);

        let join_handles = self
            .tasks
            .iter()
            .cloned()
            .map(|scheduled| {
                let stop_rx = stop_rx.clone();
                let host = self.host.clone();
                tokio::spawn(drive(scheduled, stop_rx, host))
            })
            .collect();

        SchedulerHandle {
            tasks: self.tasks.into_iter().map(|scheduled| scheduled.task).collect(),
            stop_tx: Some(stop_tx),
            join_handles,
        }
    }
}

async fn execute_blocking(task: Arc<MaintenanceTask>) -> Result<ExecuteOutcome> {
    tokio::task::spawn_blocking(move || task.execute())
        .await
        .map_err(|err| MaintenanceError::Execution(format!("maintenance cycle join: {}", err)))
}

async fn drive(scheduled: ScheduledTask, mut stop_rx: watch::Receiver<bool>, host: HostControl) {
    let mut exit_rx: watch::Receiver<Option<ExitRequest>> = host.subscribe();
    let area = scheduled.task.area().to_string();
    let mut delay = scheduled.initial_delay;

    loop {
        if *stop_rx.borrow() || host.exit_requested().is_some() {
            break;
        }

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = exit_rx.changed() => {}
            _ = sleep(delay) => {
                match execute_blocking(Arc::clone(&scheduled.task)).await {
                    Ok(ExecuteOutcome::Fatal) => break,
                    Ok(outcome) => debug!(area = %area, ?outcome, "maintenance cycle finished"),
                    Err(err) => {
                        error!(area = %area, error = %err, "maintenance cycle did not finish");
                        host.request_exit(super::GENERIC_ERROR_EXIT_CODE, err.to_string());
                        break;
                    }
                }
                delay = scheduled.interval;
            }
        }
    }

    debug!(area = %area, "maintenance driver stopped");
}

/// Running scheduler
pub struct SchedulerHandle {
    tasks: Vec<Arc<MaintenanceTask>>,
    stop_tx: Option<watch::Sender<bool>>,
    join_handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop every task, kill in-flight git processes and wait for the drivers
    pub async fn stop(mut self) -> Result<()> {
        for task in &self.tasks {
            task.stop();
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        let handles = std::mem::take(&mut self.join_handles);
        for joined in join_all(handles).await {
            joined.map_err(|err| {
                MaintenanceError::Execution(format!("maintenance driver join: {}", err))
            })?;
        }

        info!(tasks = self.tasks.len(), "maintenance scheduler stopped");
        Ok(())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        for join_handle in self.join_handles.drain(..) {
            join_handle.abort();
        }
    }
}
