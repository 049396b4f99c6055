use super::object_dir_arg;
use crate::core::Result;
use crate::inventory::{MULTI_PACK_INDEX_FILE, PackInventory};
use crate::invoker::SharedResourceInvoker;
use crate::maintenance::task::{MaintenanceStep, MaintenanceTask};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const MULTI_PACK_INDEX_AREA: &str = "MultiPackIndex";

/// Expires unreferenced packs and rewrites the multi-pack-index
pub struct MultiPackIndexStep {
    interval: Duration,
    inventory: Arc<SharedResourceInvoker<PackInventory>>,
}

impl MultiPackIndexStep {
    pub fn new(interval: Duration, inventory: Arc<SharedResourceInvoker<PackInventory>>) -> Self {
        Self { interval, inventory }
    }
}

impl MaintenanceStep for MultiPackIndexStep {
    fn area(&self) -> &str {
        MULTI_PACK_INDEX_AREA
    }

    fn min_interval(&self) -> Duration {
        self.interval
    }

    fn perform(&self, task: &MaintenanceTask) -> Result<()> {
        if !task.enough_time_between_runs() {
            debug!("multi-pack-index ran recently, skipping");
            return Ok(());
        }

        let (pack_count, has_midx) = match self
            .inventory
            .try_invoke(|inventory| Ok((inventory.pack_count(), inventory.has_multi_pack_index())))?
        {
            Some(summary) => summary,
            None => {
                info!("pack inventory is shut down, skipping");
                return Ok(());
            }
        };

        if pack_count < 2 && !has_midx {
            debug!(pack_count, "not enough packs for a multi-pack-index");
            return Ok(());
        }

        let object_dir = object_dir_arg(&task.config().object_cache_root);
        let write_args = ["multi-pack-index", "write", object_dir.as_str()];

        let verify = match task.run_git(&["multi-pack-index", "verify", object_dir.as_str()]) {
            Some(verify) => verify,
            None => return Ok(()),
        };

        // A killed verify reports failure too; only repair what git actually rejected
        if task.is_stopping() {
            debug!("task stopping after verify, leaving artifacts untouched");
            return Ok(());
        }

        if verify.has_failures() {
            let midx_path = task.config().pack_dir().join(MULTI_PACK_INDEX_FILE);
            let report = task.repair_artifact("multi-pack-index", &midx_path, &verify, |git| {
                git.invoke(&write_args)
            });
            if report.repaired() {
                task.save_last_run_time();
            }
            return Ok(());
        }

        match task.run_git(&["multi-pack-index", "expire", object_dir.as_str()]) {
            Some(expire) if !expire.has_failures() => {}
            _ => return Ok(()),
        }

        match task.run_git(&write_args) {
            Some(write) if !write.has_failures() => {
                info!(pack_count, "multi-pack-index rewritten");
                task.save_last_run_time();
            }
            _ => {}
        }

        Ok(())
    }
}
