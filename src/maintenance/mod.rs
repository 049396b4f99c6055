pub mod last_run;
pub mod lock;
pub mod repair;
pub mod steps;
pub mod task;

pub use last_run::LastRunFile;
pub use lock::ObjectCacheLock;
pub use repair::{DeleteResult, RepairReport};
pub use task::{ExecuteOutcome, MaintenanceStep, MaintenanceTask};
