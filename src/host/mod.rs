pub mod scheduler;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

pub use scheduler::{MaintenanceScheduler, ScheduledTask, SchedulerHandle};

/// Exit status used when an unrecoverable maintenance fault ends the host.
pub const GENERIC_ERROR_EXIT_CODE: i32 = 3;

/// A recorded request to terminate the hosting process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRequest {
    pub code: i32,
    pub reason: String,
}

/// Fatal-error channel between maintenance work and the host
///
/// Maintenance code never exits the process itself. It records an exit
/// request here; the host observes it, shuts down in order and exits with
/// the recorded status. Only the first request is kept.
#[derive(Debug, Clone)]
pub struct HostControl {
    tx: Arc<watch::Sender<Option<ExitRequest>>>,
}

impl HostControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record an exit request. Returns false if one was already recorded.
    pub fn request_exit(&self, code: i32, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let recorded = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(ExitRequest {
                code,
                reason: reason.clone(),
            });
            true
        });

        if recorded {
            error!(exit_code = code, reason = %reason, "host exit requested");
        }
        recorded
    }

    pub fn exit_requested(&self) -> Option<ExitRequest> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ExitRequest>> {
        self.tx.subscribe()
    }

    /// Wait until some component requests the host to exit
    pub async fn wait_for_exit(&self) -> ExitRequest {
        let mut rx = self.subscribe();
        loop {
            if let Some(request) = rx.borrow_and_update().clone() {
                return request;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                return ExitRequest {
                    code: GENERIC_ERROR_EXIT_CODE,
                    reason: "host control channel closed".to_string(),
                };
            }
        }
    }
}

impl Default for HostControl {
    fn default() -> Self {
        Self::new()
    }
}
