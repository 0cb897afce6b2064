//! hostmon: periodic host metric sampling with bounded in-memory history.
//!
//! ```text
//!  CollectionScheduler ──tick──► MetricSource::collect() ──save──► TimeSeriesStore
//!                                                                        ▲
//!  HTTP query API ───────────── latest / range / stats / clear ──────────┘
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod scheduler;
pub mod server;
pub mod store;

pub use config::{Config, ConfigOverrides};
pub use error::{
    CollectError, ConfigError, InvalidSortKey, LoggingError, SchedulerError, UnknownClass,
};
pub use monitor::{MetricClass, MetricPayload, MetricRecord, MetricSource, SharedSource, SystemMonitor};
pub use scheduler::{CollectionScheduler, PassReport};
pub use store::{RangeQuery, TimeSeriesStore};
