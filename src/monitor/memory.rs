use sysinfo::System;

use super::{MemoryMetrics, MetricClass, MetricPayload, MetricRecord, MetricSource};
use crate::error::CollectError;

pub struct MemoryMonitor {
    system: System,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self { system }
    }

    pub fn refresh(&mut self) {
        self.system.refresh_memory();
    }

    /// Returns memory usage in percent, counting everything not available as used
    pub fn usage(&self) -> f64 {
        let total = self.system.total_memory();
        percent(total.saturating_sub(self.system.available_memory()), total)
    }

    pub fn snapshot(&self) -> MemoryMetrics {
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();

        MemoryMetrics {
            memory_total: self.system.total_memory(),
            memory_available: self.system.available_memory(),
            memory_used: self.system.used_memory(),
            memory_percent: self.usage(),
            memory_free: self.system.free_memory(),
            swap_total,
            swap_used,
            swap_free: self.system.free_swap(),
            swap_percent: percent(swap_used, swap_total),
        }
    }
}

/// `part / whole` in percent, 0 when `whole` is 0
pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MemoryMonitor {
    fn class(&self) -> MetricClass {
        MetricClass::Memory
    }

    fn collect(&mut self) -> Result<MetricRecord, CollectError> {
        self.refresh();
        if self.system.total_memory() == 0 {
            return Err(CollectError::Unavailable {
                class: MetricClass::Memory,
                reason: "platform reported zero total memory".to_string(),
            });
        }
        Ok(MetricRecord::now(MetricPayload::Memory(self.snapshot())))
    }
}
