//! Error types for hostmon.
//!
//! Store operations do not appear here: an unknown class or an empty history is
//! reported through `bool`/`Option`/empty returns, never as an error.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::monitor::MetricClass;

/// Failure of a single source to produce a sample.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("{class} source unavailable: {reason}")]
    Unavailable { class: MetricClass, reason: String },

    #[error("{class} source I/O error: {source}")]
    Io {
        class: MetricClass,
        #[source]
        source: std::io::Error,
    },

    #[error("{class} collection timed out after {timeout:?}")]
    Timeout { class: MetricClass, timeout: Duration },

    #[error("{class} source is still busy with an earlier collection")]
    Busy { class: MetricClass },

    #[error("{class} collector panicked")]
    Panicked { class: MetricClass },
}

impl CollectError {
    pub fn class(&self) -> MetricClass {
        match self {
            Self::Unavailable { class, .. }
            | Self::Io { class, .. }
            | Self::Timeout { class, .. }
            | Self::Busy { class }
            | Self::Panicked { class } => *class,
        }
    }
}

/// A metric class name that is not one of the five known keys
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown metric class '{0}'")]
pub struct UnknownClass(pub String);

/// A process ordering other than `cpu` or `memory`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("sort key must be 'cpu' or 'memory', got '{0}'")]
pub struct InvalidSortKey(pub String);

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install global subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}
