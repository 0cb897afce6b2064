use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::time::Instant;

use sysinfo::Networks;

use super::{InterfaceCounters, MetricClass, MetricPayload, MetricRecord, MetricSource, NetworkMetrics};
use crate::error::CollectError;

const NET_DEV_PATH: &str = "/proc/net/dev";

/// Monitors per-interface traffic counters
pub struct NetworkMonitor {
    networks: Networks,
    /// (bytes_sent, bytes_recv) at the previous sample
    last_totals: Option<(u64, u64, Instant)>,
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            last_totals: None,
        }
    }

    pub fn refresh(&mut self) {
        self.networks.refresh_list();
    }

    /// Drop counters per interface from /proc/net/dev; sysinfo does not expose them
    fn read_drop_counters() -> Option<HashMap<String, (u64, u64)>> {
        let content = fs::read_to_string(NET_DEV_PATH).ok()?;
        Some(Self::parse_net_dev(&content))
    }

    fn parse_net_dev(content: &str) -> HashMap<String, (u64, u64)> {
        let mut drops = HashMap::new();

        // Two header lines, then "iface: rx(8 fields) tx(8 fields)"
        for line in content.lines().skip(2) {
            let Some((name, counters)) = line.split_once(':') else {
                continue;
            };
            let fields: Vec<u64> = counters
                .split_whitespace()
                .filter_map(|f| f.parse().ok())
                .collect();
            if fields.len() < 16 {
                continue;
            }
            drops.insert(name.trim().to_string(), (fields[3], fields[11]));
        }

        drops
    }

    pub fn snapshot(&mut self) -> NetworkMetrics {
        let drops = Self::read_drop_counters();

        let mut interfaces = BTreeMap::new();
        for (name, data) in &self.networks {
            let iface_drops = drops.as_ref().and_then(|d| d.get(name.as_str()));
            interfaces.insert(
                name.clone(),
                InterfaceCounters {
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    packets_sent: data.total_packets_transmitted(),
                    packets_recv: data.total_packets_received(),
                    errin: data.total_errors_on_received(),
                    errout: data.total_errors_on_transmitted(),
                    dropin: iface_drops.map(|&(rx, _)| rx),
                    dropout: iface_drops.map(|&(_, tx)| tx),
                },
            );
        }

        let sum = |f: fn(&InterfaceCounters) -> u64| interfaces.values().map(f).sum::<u64>();
        let bytes_sent = sum(|c| c.bytes_sent);
        let bytes_recv = sum(|c| c.bytes_recv);
        let packets_sent = sum(|c| c.packets_sent);
        let packets_recv = sum(|c| c.packets_recv);
        let errin = sum(|c| c.errin);
        let errout = sum(|c| c.errout);

        // Totals of drop counters are only meaningful when every interface has them
        let sum_opt = |f: fn(&InterfaceCounters) -> Option<u64>| {
            interfaces.values().map(f).sum::<Option<u64>>()
        };
        let (dropin, dropout) = if drops.is_some() {
            (sum_opt(|c| c.dropin), sum_opt(|c| c.dropout))
        } else {
            (None, None)
        };

        let now = Instant::now();
        let rates = self.last_totals.and_then(|(sent, recv, then)| {
            let elapsed = now.duration_since(then).as_secs_f64();
            (elapsed > 0.0).then(|| {
                (
                    bytes_sent.saturating_sub(sent) as f64 / elapsed,
                    bytes_recv.saturating_sub(recv) as f64 / elapsed,
                )
            })
        });
        self.last_totals = Some((bytes_sent, bytes_recv, now));

        NetworkMetrics {
            bytes_sent,
            bytes_recv,
            packets_sent,
            packets_recv,
            errin,
            errout,
            dropin,
            dropout,
            bytes_sent_per_sec: rates.map(|(s, _)| s),
            bytes_recv_per_sec: rates.map(|(_, r)| r),
            interfaces,
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for NetworkMonitor {
    fn class(&self) -> MetricClass {
        MetricClass::Network
    }

    fn collect(&mut self) -> Result<MetricRecord, CollectError> {
        self.refresh();
        Ok(MetricRecord::now(MetricPayload::Network(self.snapshot())))
    }
}
