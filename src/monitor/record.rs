use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InvalidSortKey, UnknownClass};

/// Fixed set of metric classes the store keeps history for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricClass {
    Cpu,
    Memory,
    Disk,
    Network,
    Process,
}

impl MetricClass {
    /// Every class, in canonical order
    pub const ALL: [MetricClass; 5] = [
        Self::Cpu,
        Self::Memory,
        Self::Disk,
        Self::Network,
        Self::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
            Self::Process => "process",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for MetricClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricClass {
    type Err = UnknownClass;

    /// Keys are matched exactly; "CPU" is not "cpu".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            "disk" => Ok(Self::Disk),
            "network" => Ok(Self::Network),
            "process" => Ok(Self::Process),
            other => Err(UnknownClass(other.to_string())),
        }
    }
}

/// One timestamped sample of one metric class.
///
/// Serializes flat: the payload's fields side by side with `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: MetricPayload,
}

impl MetricRecord {
    /// A record stamped now
    pub fn now(payload: MetricPayload) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            payload,
        }
    }

    /// A record with no timestamp; the store stamps it on insertion
    pub fn unstamped(payload: MetricPayload) -> Self {
        Self {
            timestamp: None,
            payload,
        }
    }

    pub fn at(timestamp: DateTime<Utc>, payload: MetricPayload) -> Self {
        Self {
            timestamp: Some(timestamp),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricPayload {
    Cpu(CpuMetrics),
    Memory(MemoryMetrics),
    Disk(DiskMetrics),
    Network(NetworkMetrics),
    Process(ProcessSnapshot),
    /// Free-form fields for anything without a structured shape
    Fields(BTreeMap<String, serde_json::Value>),
}

impl MetricPayload {
    /// The class this payload was produced for, if it is a structured one
    pub fn class(&self) -> Option<MetricClass> {
        match self {
            Self::Cpu(_) => Some(MetricClass::Cpu),
            Self::Memory(_) => Some(MetricClass::Memory),
            Self::Disk(_) => Some(MetricClass::Disk),
            Self::Network(_) => Some(MetricClass::Network),
            Self::Process(_) => Some(MetricClass::Process),
            Self::Fields(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuMetrics {
    pub cpu_percent: f32,
    pub cpu_percent_per_core: Vec<f32>,
    pub cpu_count_logical: usize,
    pub cpu_count_physical: Option<usize>,
    /// MHz
    pub cpu_freq_current: Option<f64>,
    pub cpu_freq_min: Option<f64>,
    pub cpu_freq_max: Option<f64>,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryMetrics {
    pub memory_total: u64,
    pub memory_available: u64,
    pub memory_used: u64,
    pub memory_percent: f64,
    pub memory_free: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
    pub swap_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskPartition {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskMetrics {
    pub partitions: Vec<DiskPartition>,
    pub io_read_bytes: Option<u64>,
    pub io_write_bytes: Option<u64>,
    pub io_read_count: Option<u64>,
    pub io_write_count: Option<u64>,
    /// Milliseconds spent reading, summed over devices
    pub io_read_time: Option<u64>,
    pub io_write_time: Option<u64>,
    pub io_read_bytes_per_sec: Option<f64>,
    pub io_write_bytes_per_sec: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: Option<u64>,
    pub dropout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkMetrics {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: Option<u64>,
    pub dropout: Option<u64>,
    pub bytes_sent_per_sec: Option<f64>,
    pub bytes_recv_per_sec: Option<f64>,
    pub interfaces: BTreeMap<String, InterfaceCounters>,
}

/// Ordering used for the top-N process listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessSortKey {
    #[default]
    Cpu,
    Memory,
}

impl ProcessSortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for ProcessSortKey {
    type Err = InvalidSortKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            other => Err(InvalidSortKey(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_percent: f64,
    pub memory_info_rss: u64,
    pub status: String,
    pub username: Option<String>,
    /// Seconds since the Unix epoch
    pub create_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub processes: Vec<ProcessInfo>,
    pub sort_by: ProcessSortKey,
    pub limit: usize,
}
