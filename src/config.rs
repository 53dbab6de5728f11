use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const AUDIT_DIR_ENV: &str = "GRADEKEEPER_AUDIT_DIR";
pub const WORKERS_MAX_ENV: &str = "GRADEKEEPER_WORKERS_MAX";

pub const RECORDS_CACHE: &str = "records";
pub const REPORTS_CACHE: &str = "reports";

const DEFAULT_CAPACITY: usize = 150;
const DEFAULT_ROTATION_BYTES: u64 = 10 * 1024 * 1024;

/// Top-level configuration for the cache, refresh, worker pool and audit
/// components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub cache: CacheConfig,
    pub refresh: RefreshConfig,
    pub pool: PoolConfig,
    pub audit: AuditConfig,
}

impl CoreConfig {
    /// Loads the configuration from an optional TOML file, then applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml-config")]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    #[cfg(not(feature = "toml-config"))]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: "built without the `toml-config` feature".into(),
        })
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse {
            path: PathBuf::new(),
            message: err.to_string(),
        })
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = env::var(AUDIT_DIR_ENV) {
            self.audit.dir = PathBuf::from(dir);
        }
        if let Ok(value) = env::var(WORKERS_MAX_ENV) {
            self.pool.max_workers = value.trim().parse().map_err(|_| ConfigError::Env {
                var: WORKERS_MAX_ENV,
                value,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.capacity_for(RECORDS_CACHE)?;
        self.cache.capacity_for(REPORTS_CACHE)?;
        for name in self.cache.capacities.keys() {
            self.cache.capacity_for(name)?;
        }
        self.refresh.validate()?;
        self.pool.validate()?;
        self.audit.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_capacity: usize,
    /// Per-cache overrides keyed by cache name.
    pub capacities: BTreeMap<String, usize>,
}

impl CacheConfig {
    pub fn capacity_for(&self, name: &str) -> Result<usize, ConfigError> {
        let capacity = self
            .capacities
            .get(name)
            .copied()
            .unwrap_or(self.default_capacity);
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name: name.into() });
        }
        Ok(capacity)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            capacities: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    /// How long shutdown waits for an in-flight refresh cycle.
    pub grace_ms: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                what: "refresh interval",
            });
        }
        Ok(())
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            grace_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Bounded wait for in-flight jobs once a stop is requested.
    pub grace_ms: u64,
    pub progress_interval_ms: u64,
    /// Draw an `indicatif` progress bar on stderr while a batch runs.
    pub show_progress: bool,
}

impl PoolConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Clamps a requested worker count into `[min, max]`, where `max` is
    /// also capped by the available hardware parallelism. The lower bound
    /// wins when the machine has fewer cores than `min_workers`.
    pub fn clamp_workers(&self, requested: usize) -> usize {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(self.min_workers);
        let upper = self.max_workers.min(hardware).max(self.min_workers);
        requested.clamp(self.min_workers, upper)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_workers == 0 || self.min_workers > self.max_workers {
            return Err(ConfigError::WorkerBounds {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                what: "progress interval",
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 8,
            grace_ms: 3_000,
            progress_interval_ms: 500,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub rotation_bytes: u64,
    pub shutdown_timeout_ms: u64,
}

impl AuditConfig {
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_bytes == 0 {
            return Err(ConfigError::ZeroRotationThreshold);
        }
        Ok(())
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_audit_dir(),
            rotation_bytes: DEFAULT_ROTATION_BYTES,
            shutdown_timeout_ms: 5_000,
        }
    }
}

fn default_audit_dir() -> PathBuf {
    ProjectDirs::from("", "", "gradekeeper")
        .map(|dirs| dirs.data_dir().join("audit"))
        .unwrap_or_else(|| PathBuf::from("audit_logs"))
}
