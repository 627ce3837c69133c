//! Configuration module for the portscope scanner

use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Per-probe timeout used when nothing else is configured (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default number of probes allowed in flight at once
pub const DEFAULT_CONCURRENCY: usize = 500;

/// Default traffic counter polling period (milliseconds)
pub const DEFAULT_TRAFFIC_INTERVAL_MS: u64 = 1000;

const CONFIG_FILE_NAME: &str = ".portscope.toml";

/// Main configuration structure for scanning operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Timeout for each connection attempt in milliseconds
    pub timeout: u64,

    /// Maximum number of probes in flight
    pub concurrency: usize,

    /// Optional bound on the whole scan in milliseconds
    pub deadline: Option<u64>,

    /// Traffic counter polling period in milliseconds
    pub traffic_interval: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            deadline: None,
            traffic_interval: DEFAULT_TRAFFIC_INTERVAL_MS,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-probe timeout in milliseconds
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the fan-out limit
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Bound the whole scan
    pub fn with_deadline(mut self, deadline: Option<u64>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_traffic_interval(mut self, interval: u64) -> Self {
        self.traffic_interval = interval;
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn deadline_duration(&self) -> Option<Duration> {
        self.deadline.map(Duration::from_millis)
    }

    pub fn traffic_interval_duration(&self) -> Duration {
        Duration::from_millis(self.traffic_interval)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: ScanConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location, `~/.portscope.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an error rather than being silently ignored.
    pub fn load_default_config() -> crate::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                let config = Self::from_toml_file(&path)?;
                log::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.timeout == 0 {
            return Err(ScanError::Config("Timeout must be greater than 0".to_string()));
        }

        if self.concurrency == 0 {
            return Err(ScanError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.concurrency > Semaphore::MAX_PERMITS {
            return Err(ScanError::Config(format!(
                "Concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        if self.deadline == Some(0) {
            return Err(ScanError::Config("Deadline must be greater than 0".to_string()));
        }

        if self.traffic_interval == 0 {
            return Err(ScanError::Config(
                "Traffic interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
