use std::fs;
use std::time::Instant;

use sysinfo::Disks;

use super::memory::percent;
use super::{DiskMetrics, DiskPartition, MetricClass, MetricPayload, MetricRecord, MetricSource};
use crate::error::CollectError;

const DISKSTATS_PATH: &str = "/proc/diskstats";
const SECTOR_SIZE: u64 = 512;

/// Cumulative I/O counters summed over whole physical devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub read_count: u64,
    pub read_bytes: u64,
    pub read_time_ms: u64,
    pub write_count: u64,
    pub write_bytes: u64,
    pub write_time_ms: u64,
}

/// Monitors mounted filesystems through sysinfo and I/O activity through /proc/diskstats
pub struct DiskMonitor {
    last_io: Option<(DiskIoCounters, Instant)>,
}

impl DiskMonitor {
    pub fn new() -> Self {
        Self {
            last_io: Self::read_disk_stats().map(|io| (io, Instant::now())),
        }
    }

    /// Check if a device name represents a physical (whole) device rather than a partition.
    /// Handles traditional devices (sda, hda, vda), NVMe (nvme0n1), MMC (mmcblk0), etc.
    fn is_physical_device(device_name: &str) -> bool {
        // Skip virtual devices
        if device_name.starts_with("loop")
            || device_name.starts_with("ram")
            || device_name.starts_with("dm-")
        {
            return false;
        }

        // NVMe: nvme0n1 is the device, nvme0n1p1 a partition
        if device_name.starts_with("nvme") {
            if let Some(n_pos) = device_name[4..].find('n') {
                let after_n = &device_name[4 + n_pos + 1..];
                let after_namespace: String =
                    after_n.chars().skip_while(|c| c.is_ascii_digit()).collect();
                return !after_namespace.starts_with('p');
            }
            return true;
        }

        // MMC/SD: mmcblk0 is the device, mmcblk0p1 a partition
        if let Some(after_prefix) = device_name.strip_prefix("mmcblk") {
            let after_device_num: String =
                after_prefix.chars().skip_while(|c| c.is_ascii_digit()).collect();
            return !after_device_num.starts_with('p');
        }

        // sd*, hd*, vd*, xvd*: base ends with a letter, partition with a digit
        device_name
            .chars()
            .last()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false)
    }

    /// Read cumulative counters from /proc/diskstats, `None` where it does not exist
    fn read_disk_stats() -> Option<DiskIoCounters> {
        let content = fs::read_to_string(DISKSTATS_PATH).ok()?;
        Some(Self::parse_disk_stats(&content))
    }

    fn parse_disk_stats(content: &str) -> DiskIoCounters {
        let mut total = DiskIoCounters::default();

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 14 {
                continue;
            }

            if !Self::is_physical_device(parts[2]) {
                continue;
            }

            // Fields after the device name: reads, merged, sectors, ms, writes, merged, sectors, ms
            let field = |i: usize| parts[i].parse::<u64>().ok();
            if let (Some(reads), Some(read_sectors), Some(read_ms), Some(writes), Some(write_sectors), Some(write_ms)) =
                (field(3), field(5), field(6), field(7), field(9), field(10))
            {
                total.read_count += reads;
                total.read_bytes += read_sectors * SECTOR_SIZE;
                total.read_time_ms += read_ms;
                total.write_count += writes;
                total.write_bytes += write_sectors * SECTOR_SIZE;
                total.write_time_ms += write_ms;
            }
        }

        total
    }

    fn partitions() -> Vec<DiskPartition> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| {
                let total = d.total_space();
                let free = d.available_space();
                let used = total.saturating_sub(free);
                DiskPartition {
                    device: d.name().to_string_lossy().to_string(),
                    mountpoint: d.mount_point().to_string_lossy().to_string(),
                    fstype: d.file_system().to_string_lossy().to_string(),
                    total,
                    used,
                    free,
                    percent: percent(used, total),
                }
            })
            .collect()
    }

    pub fn snapshot(&mut self) -> DiskMetrics {
        let io = Self::read_disk_stats();
        let now = Instant::now();

        let rates = match (io, self.last_io) {
            (Some(current), Some((previous, then))) => {
                let elapsed = now.duration_since(then).as_secs_f64();
                (elapsed > 0.0).then(|| {
                    (
                        current.read_bytes.saturating_sub(previous.read_bytes) as f64 / elapsed,
                        current.write_bytes.saturating_sub(previous.write_bytes) as f64 / elapsed,
                    )
                })
            }
            _ => None,
        };

        if let Some(current) = io {
            self.last_io = Some((current, now));
        }

        DiskMetrics {
            partitions: Self::partitions(),
            io_read_bytes: io.map(|c| c.read_bytes),
            io_write_bytes: io.map(|c| c.write_bytes),
            io_read_count: io.map(|c| c.read_count),
            io_write_count: io.map(|c| c.write_count),
            io_read_time: io.map(|c| c.read_time_ms),
            io_write_time: io.map(|c| c.write_time_ms),
            io_read_bytes_per_sec: rates.map(|(r, _)| r),
            io_write_bytes_per_sec: rates.map(|(_, w)| w),
        }
    }
}

impl Default for DiskMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for DiskMonitor {
    fn class(&self) -> MetricClass {
        MetricClass::Disk
    }

    fn collect(&mut self) -> Result<MetricRecord, CollectError> {
        Ok(MetricRecord::now(MetricPayload::Disk(self.snapshot())))
    }
}
