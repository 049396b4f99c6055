use super::object_dir_arg;
use crate::core::Result;
use crate::maintenance::task::{MaintenanceStep, MaintenanceTask};
use std::time::Duration;
use tracing::{debug, info};

pub const COMMIT_GRAPH_AREA: &str = "CommitGraph";

/// Keeps the split commit-graph chain of the object cache current
pub struct CommitGraphStep {
    interval: Duration,
}

impl CommitGraphStep {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl MaintenanceStep for CommitGraphStep {
    fn area(&self) -> &str {
        COMMIT_GRAPH_AREA
    }

    fn min_interval(&self) -> Duration {
        self.interval
    }

    fn perform(&self, task: &MaintenanceTask) -> Result<()> {
        if !task.enough_time_between_runs() {
            debug!("commit-graph ran recently, skipping");
            return Ok(());
        }

        let object_dir = object_dir_arg(&task.config().object_cache_root);
        let write_args = [
            "commit-graph",
            "write",
            "--reachable",
            "--split",
            object_dir.as_str(),
        ];

        let verify = match task.run_git(&["commit-graph", "verify", "--shallow", object_dir.as_str()]) {
            Some(verify) => verify,
            None => return Ok(()),
        };

        // A killed verify reports failure too; only repair what git actually rejected
        if task.is_stopping() {
            debug!("task stopping after verify, leaving artifacts untouched");
            return Ok(());
        }

        if verify.has_failures() {
            let chain_dir = task
                .config()
                .object_cache_root
                .join("info")
                .join("commit-graphs");
            let report =
                task.repair_artifact("commit-graph", &chain_dir, &verify, |git| git.invoke(&write_args));
            if report.repaired() {
                task.save_last_run_time();
            }
            return Ok(());
        }

        match task.run_git(&write_args) {
            Some(write) if !write.has_failures() => {
                info!("commit-graph updated");
                task.save_last_run_time();
            }
            _ => {}
        }

        Ok(())
    }
}
