use std::fs;
use std::thread;
use std::time::Instant;

use once_cell::unsync::OnceCell;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{CpuMetrics, MetricClass, MetricPayload, MetricRecord, MetricSource};
use crate::error::CollectError;

const CPUFREQ_DIR: &str = "/sys/devices/system/cpu/cpu0/cpufreq";

pub struct CpuMonitor {
    system: System,
    /// (min, max) in MHz; hardware limits never change, so read once
    freq_limits: OnceCell<(Option<f64>, Option<f64>)>,
    /// Usage is the delta between two refreshes at least this far apart
    last_refresh: Instant,
}

impl CpuMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        // Initial refresh to get baseline
        system.refresh_cpu_usage();
        Self {
            system,
            freq_limits: OnceCell::new(),
            last_refresh: Instant::now(),
        }
    }

    /// Refreshes usage and frequency, first waiting out whatever remains of
    /// `MINIMUM_CPU_UPDATE_INTERVAL` since the previous refresh.
    pub fn refresh(&mut self) {
        let since = self.last_refresh.elapsed();
        if since < MINIMUM_CPU_UPDATE_INTERVAL {
            thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
        self.system.refresh_cpu_usage();
        self.system.refresh_cpu_frequency();
        self.last_refresh = Instant::now();
    }

    /// Returns CPU usage for each core in percent
    pub fn per_core_usage(&self) -> Vec<f32> {
        self.system.cpus().iter().map(|cpu| cpu.cpu_usage()).collect()
    }

    /// Returns average CPU usage across all cores in percent
    pub fn average_usage(&self) -> f32 {
        self.system.global_cpu_usage()
    }

    /// Returns the number of logical CPU cores
    pub fn core_count(&self) -> usize {
        self.system.cpus().len()
    }

    /// Mean of the per-core frequencies, `None` when the platform reports none
    fn current_frequency(&self) -> Option<f64> {
        let freqs: Vec<u64> = self
            .system
            .cpus()
            .iter()
            .map(|cpu| cpu.frequency())
            .filter(|&mhz| mhz > 0)
            .collect();

        if freqs.is_empty() {
            return None;
        }

        Some(freqs.iter().sum::<u64>() as f64 / freqs.len() as f64)
    }

    fn frequency_limits(&self) -> (Option<f64>, Option<f64>) {
        *self.freq_limits.get_or_init(|| {
            (
                read_khz_as_mhz("cpuinfo_min_freq"),
                read_khz_as_mhz("cpuinfo_max_freq"),
            )
        })
    }

    pub fn snapshot(&self) -> CpuMetrics {
        let (cpu_freq_min, cpu_freq_max) = self.frequency_limits();
        let load = System::load_average();

        CpuMetrics {
            cpu_percent: self.average_usage(),
            cpu_percent_per_core: self.per_core_usage(),
            cpu_count_logical: self.core_count(),
            cpu_count_physical: self.system.physical_core_count(),
            cpu_freq_current: self.current_frequency(),
            cpu_freq_min,
            cpu_freq_max,
            load_avg_1: load.one,
            load_avg_5: load.five,
            load_avg_15: load.fifteen,
        }
    }
}

/// Reads a cpufreq attribute (kHz) and converts it to MHz
fn read_khz_as_mhz(attribute: &str) -> Option<f64> {
    let raw = fs::read_to_string(format!("{}/{}", CPUFREQ_DIR, attribute)).ok()?;
    parse_khz_as_mhz(&raw)
}

fn parse_khz_as_mhz(raw: &str) -> Option<f64> {
    raw.trim().parse::<u64>().ok().map(|khz| khz as f64 / 1000.0)
}

impl Default for CpuMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for CpuMonitor {
    fn class(&self) -> MetricClass {
        MetricClass::Cpu
    }

    fn collect(&mut self) -> Result<MetricRecord, CollectError> {
        self.refresh();
        if self.core_count() == 0 {
            return Err(CollectError::Unavailable {
                class: MetricClass::Cpu,
                reason: "no CPUs reported by the platform".to_string(),
            });
        }
        Ok(MetricRecord::now(MetricPayload::Cpu(self.snapshot())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_cpufreq_attribute() {
        assert_eq!(parse_khz_as_mhz("2400000\n"), Some(2400.0));
        assert_eq!(parse_khz_as_mhz("garbage"), None);
    }

    #[test]
    fn test_collect_reports_every_core() {
        let mut monitor = CpuMonitor::new();
        let record = monitor.collect().unwrap();

        match record.payload {
            MetricPayload::Cpu(cpu) => {
                assert_eq!(cpu.cpu_percent_per_core.len(), cpu.cpu_count_logical);
                assert!(cpu.cpu_count_logical > 0);
            }
            other => panic!("expected cpu payload, got {:?}", other),
        }
        assert!(record.timestamp.is_some());
    }

    fn usage(record: MetricRecord) -> f32 {
        match record.payload {
            MetricPayload::Cpu(cpu) => cpu.cpu_percent,
            other => panic!("expected cpu payload, got {:?}", other),
        }
    }

    #[test]
    fn test_back_to_back_collects_see_a_busy_core() {
        let stop = Arc::new(AtomicBool::new(false));
        let spinner = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    std::hint::spin_loop();
                }
            })
        };

        let mut monitor = CpuMonitor::new();
        let started = Instant::now();
        let first = usage(monitor.collect().unwrap());
        let second = usage(monitor.collect().unwrap());
        let elapsed = started.elapsed();

        stop.store(true, Ordering::Relaxed);
        spinner.join().unwrap();

        assert!(elapsed >= MINIMUM_CPU_UPDATE_INTERVAL);
        assert!(first > 0.0, "first collect read {}", first);
        assert!(second > 0.0, "second collect read {}", second);
    }
}
