//! Metric sources: one per metric class, each producing a timestamped snapshot on demand.

mod cpu;
mod disk;
mod memory;
mod network;
mod process;
mod record;

use std::sync::Arc;

use parking_lot::Mutex;

pub use cpu::CpuMonitor;
pub use disk::{DiskIoCounters, DiskMonitor};
pub use memory::MemoryMonitor;
pub use network::NetworkMonitor;
pub use process::{ProcessMonitor, DEFAULT_PROCESS_LIMIT};
pub use record::{
    CpuMetrics, DiskMetrics, DiskPartition, InterfaceCounters, MemoryMetrics, MetricClass,
    MetricPayload, MetricRecord, NetworkMetrics, ProcessInfo, ProcessSnapshot, ProcessSortKey,
};

use crate::error::CollectError;

/// A producer of snapshots for one metric class.
///
/// Implementations may keep OS counter baselines between calls (for rates),
/// nothing else.
pub trait MetricSource: Send {
    fn class(&self) -> MetricClass;

    fn collect(&mut self) -> Result<MetricRecord, CollectError>;
}

/// A source shared between the scheduler and the query layer
pub type SharedSource = Arc<Mutex<dyn MetricSource>>;

pub fn shared<S: MetricSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(source))
}

/// The host's sources, constructed once at startup
pub struct SystemMonitor {
    pub cpu: Arc<Mutex<CpuMonitor>>,
    pub memory: Arc<Mutex<MemoryMonitor>>,
    pub disk: Arc<Mutex<DiskMonitor>>,
    pub network: Arc<Mutex<NetworkMonitor>>,
    pub process: Arc<Mutex<ProcessMonitor>>,
}

impl SystemMonitor {
    pub fn new(process_limit: usize, process_sort: ProcessSortKey) -> Self {
        Self {
            cpu: Arc::new(Mutex::new(CpuMonitor::new())),
            memory: Arc::new(Mutex::new(MemoryMonitor::new())),
            disk: Arc::new(Mutex::new(DiskMonitor::new())),
            network: Arc::new(Mutex::new(NetworkMonitor::new())),
            process: Arc::new(Mutex::new(ProcessMonitor::new(process_limit, process_sort))),
        }
    }

    /// Every source as a trait object, in canonical class order
    pub fn sources(&self) -> Vec<SharedSource> {
        vec![
            self.cpu.clone() as SharedSource,
            self.memory.clone() as SharedSource,
            self.disk.clone() as SharedSource,
            self.network.clone() as SharedSource,
            self.process.clone() as SharedSource,
        ]
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_LIMIT, ProcessSortKey::Cpu)
    }
}
