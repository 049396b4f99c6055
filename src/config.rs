use crate::core::{MaintenanceError, Result};
use crate::invoker::config::{DEFAULT_IDLE_PERIOD, InvokerConfig};
use crate::maintenance::lock::DEFAULT_LOCK_FILE_NAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maintenance host configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Working tree root of the repository being maintained
    pub repo_root: PathBuf,

    /// Shared object cache (holds `pack/` and the step lock file)
    pub object_cache_root: PathBuf,

    /// Directory for per-step last-run files
    pub maintenance_dir: PathBuf,

    /// Git executable
    pub git_binary: PathBuf,

    /// Lock file name inside the object cache
    pub lock_file_name: String,

    /// Minimum time between two commit-graph passes
    pub commit_graph_interval: Duration,

    /// Minimum time between two multi-pack-index passes
    pub multi_pack_index_interval: Duration,

    /// How often the scheduler offers each step a chance to run
    pub schedule_interval: Duration,

    /// Idle period before the shared pack inventory is dropped
    pub idle_period: Duration,
}

impl MaintenanceConfig {
    /// Create a configuration for a repository and its object cache
    pub fn new(repo_root: impl Into<PathBuf>, object_cache_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        let maintenance_dir = repo_root.join(".git").join("maintenance");

        Self {
            repo_root,
            object_cache_root: object_cache_root.into(),
            maintenance_dir,
            git_binary: PathBuf::from("git"),
            lock_file_name: DEFAULT_LOCK_FILE_NAME.to_string(),
            commit_graph_interval: Duration::from_secs(60 * 60),
            multi_pack_index_interval: Duration::from_secs(24 * 60 * 60),
            // Longer than the idle period so each cycle sees a fresh pack scan
            schedule_interval: Duration::from_secs(20 * 60),
            idle_period: DEFAULT_IDLE_PERIOD,
        }
    }

    /// Set the last-run directory
    pub fn maintenance_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.maintenance_dir = dir.into();
        self
    }

    /// Set the git executable
    pub fn git_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.git_binary = binary.into();
        self
    }

    /// Set the lock file name
    pub fn lock_file_name(mut self, name: &str) -> Self {
        self.lock_file_name = name.to_string();
        self
    }

    /// Set commit-graph throttle interval
    pub fn commit_graph_interval(mut self, interval: Duration) -> Self {
        self.commit_graph_interval = interval;
        self
    }

    /// Set multi-pack-index throttle interval
    pub fn multi_pack_index_interval(mut self, interval: Duration) -> Self {
        self.multi_pack_index_interval = interval;
        self
    }

    /// Set scheduler cadence
    pub fn schedule_interval(mut self, interval: Duration) -> Self {
        self.schedule_interval = interval;
        self
    }

    /// Set shared handle idle period
    pub fn idle_period(mut self, period: Duration) -> Self {
        self.idle_period = period;
        self
    }

    /// Invoker settings derived from this configuration
    pub fn invoker_config(&self) -> InvokerConfig {
        InvokerConfig::new().idle_period(self.idle_period)
    }

    /// Pack directory inside the object cache
    pub fn pack_dir(&self) -> PathBuf {
        self.object_cache_root.join("pack")
    }

    /// Last-run timestamp file for a maintenance area
    pub fn last_run_path(&self, area: &str) -> PathBuf {
        self.maintenance_dir.join(format!("{}.time", area.to_lowercase()))
    }

    /// Apply values from a JSON overrides file
    pub fn with_overrides_file(self, path: &Path) -> Result<Self> {
        let overrides = ConfigOverrides::load(path)?;
        Ok(self.with_overrides(overrides))
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(dir) = overrides.maintenance_dir {
            self.maintenance_dir = dir;
        }
        if let Some(binary) = overrides.git_binary {
            self.git_binary = binary;
        }
        if let Some(name) = overrides.lock_file_name {
            self.lock_file_name = name;
        }
        if let Some(secs) = overrides.commit_graph_interval_secs {
            self.commit_graph_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.multi_pack_index_interval_secs {
            self.multi_pack_index_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.schedule_interval_secs {
            self.schedule_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.idle_period_secs {
            self.idle_period = Duration::from_secs(secs);
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.repo_root.as_os_str().is_empty() {
            return Err(MaintenanceError::Config("repo_root cannot be empty".to_string()));
        }

        if self.object_cache_root.as_os_str().is_empty() {
            return Err(MaintenanceError::Config(
                "object_cache_root cannot be empty".to_string(),
            ));
        }

        if self.lock_file_name.is_empty() || self.lock_file_name.contains(['/', '\\']) {
            return Err(MaintenanceError::Config(format!(
                "invalid lock file name '{}'",
                self.lock_file_name
            )));
        }

        if self.schedule_interval.is_zero() {
            return Err(MaintenanceError::Config(
                "schedule_interval must be > 0".to_string(),
            ));
        }

        self.invoker_config().validate().map_err(MaintenanceError::Config)
    }
}

/// Optional settings read from a JSON file; unset fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub maintenance_dir: Option<PathBuf>,
    pub git_binary: Option<PathBuf>,
    pub lock_file_name: Option<String>,
    pub commit_graph_interval_secs: Option<u64>,
    pub multi_pack_index_interval_secs: Option<u64>,
    pub schedule_interval_secs: Option<u64>,
    pub idle_period_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
