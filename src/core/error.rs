use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaintenanceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create shared handle: {0}")]
    HandleCreation(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Maintenance work panicked: {0}")]
    Panicked(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl MaintenanceError {
    /// True for the recoverable I/O category. Everything else aborts the host.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, MaintenanceError>;

impl From<serde_json::Error> for MaintenanceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let io = MaintenanceError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(io.is_io());
        assert!(!MaintenanceError::Git("bad exit".into()).is_io());
        assert!(!MaintenanceError::Panicked("boom".into()).is_io());
    }

    #[test]
    fn test_json_error_is_config_error() {
        let err: MaintenanceError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, MaintenanceError::Config(_)));
        assert!(!err.is_io());
    }
}
