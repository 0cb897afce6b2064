use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use tracing::debug;

use crate::error::ConfigError;
use crate::monitor::{ProcessSortKey, DEFAULT_PROCESS_LIMIT};
use crate::scheduler::{DEFAULT_COLLECT_TIMEOUT, DEFAULT_INTERVAL};
use crate::store::DEFAULT_CAPACITY;

pub const CONFIG_FILE_NAME: &str = "hostmon.ini";
pub const MAX_PROCESS_LIMIT: usize = 100;
pub const MAX_CAPACITY: usize = 1_000_000;

/// Runtime configuration (parsed from hostmon.ini, then CLI overrides)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Records kept per metric class
    pub capacity: usize,
    pub interval: Duration,
    pub collect_timeout: Duration,
    pub bind: SocketAddr,
    /// Processes kept in each stored process snapshot
    pub process_limit: usize,
    pub process_sort: ProcessSortKey,
    /// `tracing` filter directive, overridden by RUST_LOG
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            interval: DEFAULT_INTERVAL,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            process_limit: DEFAULT_PROCESS_LIMIT,
            process_sort: ProcessSortKey::Cpu,
            log_filter: "info".to_string(),
        }
    }
}

/// Values given on the command line; `None` keeps the file/default value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub capacity: Option<usize>,
    pub interval_secs: Option<u64>,
    pub collect_timeout_secs: Option<u64>,
    pub bind: Option<SocketAddr>,
    pub process_limit: Option<usize>,
    pub process_sort: Option<ProcessSortKey>,
    pub log_filter: Option<String>,
}

impl Config {
    /// Locate the config file. Order of preference:
    /// 1. an explicit path
    /// 2. ./hostmon.ini
    /// 3. the per-user config directory
    pub fn find_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }

        directories::ProjectDirs::from("", "", "hostmon")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    /// Defaults, then the config file if one is found. An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::find_file(explicit) {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                let ini = Ini::load_from_file(&path)
                    .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
                Self::from_ini(&ini)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("storage")) {
            if let Some(v) = section.get("capacity") {
                config.capacity = parse_value("storage.capacity", v)?;
            }
        }

        if let Some(section) = ini.section(Some("scheduler")) {
            if let Some(v) = section.get("interval") {
                config.interval = Duration::from_secs(parse_value("scheduler.interval", v)?);
            }
            if let Some(v) = section.get("collect_timeout") {
                config.collect_timeout =
                    Duration::from_secs(parse_value("scheduler.collect_timeout", v)?);
            }
        }

        if let Some(section) = ini.section(Some("server")) {
            if let Some(v) = section.get("bind") {
                config.bind = parse_value("server.bind", v)?;
            }
        }

        if let Some(section) = ini.section(Some("process")) {
            if let Some(v) = section.get("limit") {
                config.process_limit = parse_value("process.limit", v)?;
            }
            if let Some(v) = section.get("sort_by") {
                config.process_sort = parse_value("process.sort_by", v)?;
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(v) = section.get("filter") {
                config.log_filter = v.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(capacity) = overrides.capacity {
            self.capacity = capacity;
        }
        if let Some(secs) = overrides.interval_secs {
            self.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.collect_timeout_secs {
            self.collect_timeout = Duration::from_secs(secs);
        }
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if let Some(limit) = overrides.process_limit {
            self.process_limit = limit;
        }
        if let Some(sort) = overrides.process_sort {
            self.process_sort = sort;
        }
        if let Some(filter) = overrides.log_filter {
            self.log_filter = filter;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CAPACITY).contains(&self.capacity) {
            return Err(invalid(
                "storage.capacity",
                &format!("must be between 1 and {}", MAX_CAPACITY),
            ));
        }
        if self.interval < Duration::from_secs(1) {
            return Err(invalid("scheduler.interval", "must be at least 1 second"));
        }
        if self.collect_timeout < Duration::from_secs(1) {
            return Err(invalid("scheduler.collect_timeout", "must be at least 1 second"));
        }
        if !(1..=MAX_PROCESS_LIMIT).contains(&self.process_limit) {
            return Err(invalid(
                "process.limit",
                &format!("must be between 1 and {}", MAX_PROCESS_LIMIT),
            ));
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| invalid(key, &e.to_string()))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
