use std::time::Duration;

/// Default time a shared handle may sit unused before it is disposed.
pub const DEFAULT_IDLE_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Shared resource invoker configuration
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Time without any access after which an unused handle is disposed
    pub idle_period: Duration,
}

impl InvokerConfig {
    /// Create a configuration with the default idle period
    pub fn new() -> Self {
        Self {
            idle_period: DEFAULT_IDLE_PERIOD,
        }
    }

    /// Set idle period
    pub fn idle_period(mut self, period: Duration) -> Self {
        self.idle_period = period;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.idle_period.is_zero() {
            return Err("idle_period must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self::new()
    }
}
