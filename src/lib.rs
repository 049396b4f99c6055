// ============================================================================
// gitkeeper library
// ============================================================================

pub mod config;
pub mod core;
pub mod host;
pub mod inventory;
pub mod invoker;
pub mod logging;
pub mod maintenance;
pub mod process;

// Re-export main types for convenience
pub use config::{ConfigOverrides, MaintenanceConfig};
pub use core::{MaintenanceError, Result};
pub use host::{
    ExitRequest, GENERIC_ERROR_EXIT_CODE, HostControl, MaintenanceScheduler, SchedulerHandle,
};
pub use inventory::{PackInventory, pack_inventory_invoker};
pub use invoker::{InvokerStats, SharedResourceInvoker, config::InvokerConfig};
pub use maintenance::{
    ExecuteOutcome, MaintenanceStep, MaintenanceTask,
    steps::{CommitGraphStep, MultiPackIndexStep},
};
pub use process::{
    GitOutput, GitProcess, GitProcessFactory, KillOutcome,
    command::{CommandGitProcess, CommandGitProcessFactory},
};
