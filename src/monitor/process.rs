use std::cmp::Ordering;
use std::ffi::OsStr;

use sysinfo::{ProcessesToUpdate, System, Users};

use super::memory::percent;
use super::{
    MetricClass, MetricPayload, MetricRecord, MetricSource, ProcessInfo, ProcessSnapshot,
    ProcessSortKey,
};
use crate::error::CollectError;

pub const DEFAULT_PROCESS_LIMIT: usize = 10;

/// Lists the heaviest processes by CPU or memory
pub struct ProcessMonitor {
    system: System,
    users: Users,
    default_limit: usize,
    default_sort: ProcessSortKey,
}

impl ProcessMonitor {
    pub fn new(default_limit: usize, default_sort: ProcessSortKey) -> Self {
        let mut system = System::new();
        // Per-process CPU usage is a delta, so take a baseline now
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Self {
            system,
            users: Users::new_with_refreshed_list(),
            default_limit,
            default_sort,
        }
    }

    pub fn refresh(&mut self) {
        self.system.refresh_memory();
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        // Owners created since the last user list load would otherwise stay nameless
        let users = &self.users;
        let unknown_owner = self
            .system
            .processes()
            .values()
            .filter_map(|process| process.user_id())
            .any(|uid| users.get_user_by_id(uid).is_none());
        if unknown_owner {
            self.users.refresh_list();
        }
    }

    /// Top `limit` processes sorted descending by `sort_by`
    pub fn top(&mut self, limit: usize, sort_by: ProcessSortKey) -> Vec<ProcessInfo> {
        self.refresh();

        let total_memory = self.system.total_memory();
        let processes = self
            .system
            .processes()
            .values()
            .map(|process| ProcessInfo {
                pid: process.pid().as_u32(),
                name: lossy(process.name()),
                cpu_percent: process.cpu_usage(),
                memory_percent: percent(process.memory(), total_memory),
                memory_info_rss: process.memory(),
                status: process.status().to_string(),
                username: process
                    .user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|user| user.name().to_string()),
                create_time: process.start_time() as f64,
            })
            .collect();

        rank(processes, limit, sort_by)
    }
}

/// Process names may be `str` or `OsStr` depending on platform; normalize both
fn lossy(name: impl AsRef<OsStr>) -> String {
    name.as_ref().to_string_lossy().into_owned()
}

fn rank(mut processes: Vec<ProcessInfo>, limit: usize, sort_by: ProcessSortKey) -> Vec<ProcessInfo> {
    let key = |p: &ProcessInfo| -> f64 {
        match sort_by {
            ProcessSortKey::Cpu => p.cpu_percent as f64,
            ProcessSortKey::Memory => p.memory_percent,
        }
    };
    processes.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    processes.truncate(limit);
    processes
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_LIMIT, ProcessSortKey::Cpu)
    }
}

impl MetricSource for ProcessMonitor {
    fn class(&self) -> MetricClass {
        MetricClass::Process
    }

    fn collect(&mut self) -> Result<MetricRecord, CollectError> {
        let (limit, sort_by) = (self.default_limit, self.default_sort);
        let processes = self.top(limit, sort_by);
        Ok(MetricRecord::now(MetricPayload::Process(ProcessSnapshot {
            processes,
            sort_by,
            limit,
        })))
    }
}
