use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Misconfiguration detected while building a component.
///
/// This is the only error class that escapes the core; everything else is
/// recovered locally or reported as a normal return value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache `{name}` must have a capacity of at least one entry")]
    ZeroCapacity { name: String },
    #[error("worker bounds must satisfy 1 <= min <= max (got min={min}, max={max})")]
    WorkerBounds { min: usize, max: usize },
    #[error("{what} must be greater than zero")]
    ZeroDuration { what: &'static str },
    #[error("audit rotation threshold must be greater than zero bytes")]
    ZeroRotationThreshold,
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value `{value}` for environment variable {var}")]
    Env { var: &'static str, value: String },
}

/// Failure talking to the external data source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to load `{id}`: {message}")]
    Load { id: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Business failure raised by a job body.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobError {
    message: String,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<io::Error> for JobError {
    fn from(err: io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<SourceError> for JobError {
    fn from(err: SourceError) -> Self {
        Self::new(err.to_string())
    }
}
