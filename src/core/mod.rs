pub mod error;

pub use error::{MaintenanceError, Result};
