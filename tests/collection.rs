use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hostmon::monitor::shared;
use hostmon::{
    CollectError, CollectionScheduler, MetricClass, MetricPayload, MetricRecord, MetricSource,
    RangeQuery, SystemMonitor, TimeSeriesStore,
};
use serde_json::json;

/// Emits 1, 2, 3, ... and fails on every tick listed in `fail_on`
struct ScriptedSource {
    class: MetricClass,
    counter: Arc<AtomicU64>,
    fail_on: Vec<u64>,
}

impl MetricSource for ScriptedSource {
    fn class(&self) -> MetricClass {
        self.class
    }

    fn collect(&mut self) -> Result<MetricRecord, CollectError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(CollectError::Io {
                class: self.class,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        let mut fields = BTreeMap::new();
        fields.insert("value".to_string(), json!(n));
        Ok(MetricRecord::unstamped(MetricPayload::Fields(fields)))
    }
}

fn values(store: &TimeSeriesStore, class: &str) -> Vec<u64> {
    store
        .range(class, RangeQuery::all())
        .iter()
        .map(|r| match &r.payload {
            MetricPayload::Fields(f) => f["value"].as_u64().unwrap(),
            other => panic!("unexpected payload {:?}", other),
        })
        .collect()
}

#[test]
fn capacity_three_keeps_last_three_passes() {
    let store = Arc::new(TimeSeriesStore::new(3));
    let counter = Arc::new(AtomicU64::new(0));
    let source = shared(ScriptedSource {
        class: MetricClass::Cpu,
        counter,
        fail_on: Vec::new(),
    });
    let scheduler = CollectionScheduler::new(Arc::clone(&store), vec![source]);

    for _ in 0..5 {
        scheduler.run_pass();
    }

    assert_eq!(values(&store, "cpu"), vec![3, 4, 5]);
    assert_eq!(store.stats()[&MetricClass::Cpu], 3);
}

#[test]
fn failing_tick_only_costs_its_own_class() {
    let store = Arc::new(TimeSeriesStore::new(10));
    let flaky = shared(ScriptedSource {
        class: MetricClass::Disk,
        counter: Arc::new(AtomicU64::new(0)),
        fail_on: vec![2],
    });
    let steady = shared(ScriptedSource {
        class: MetricClass::Memory,
        counter: Arc::new(AtomicU64::new(0)),
        fail_on: Vec::new(),
    });
    let scheduler = CollectionScheduler::new(Arc::clone(&store), vec![flaky, steady]);

    for _ in 0..3 {
        scheduler.run_pass();
    }

    assert_eq!(values(&store, "disk"), vec![1, 3]);
    assert_eq!(values(&store, "memory"), vec![1, 2, 3]);
}

#[test]
fn scheduler_keeps_running_through_failures() {
    let store = Arc::new(TimeSeriesStore::new(100));
    let counter = Arc::new(AtomicU64::new(0));
    let source = shared(ScriptedSource {
        class: MetricClass::Network,
        counter: Arc::clone(&counter),
        fail_on: vec![1, 2, 3],
    });
    let mut scheduler = CollectionScheduler::new(Arc::clone(&store), vec![source])
        .with_interval(Duration::from_millis(20));

    let first = scheduler.start().unwrap();
    assert!(!first.is_clean());
    thread::sleep(Duration::from_millis(250));
    scheduler.stop();

    assert!(counter.load(Ordering::SeqCst) > 3);
    assert!(!values(&store, "network").is_empty());
}

#[test]
fn real_sources_fill_every_class() {
    let store = Arc::new(TimeSeriesStore::new(10));
    let monitor = SystemMonitor::default();
    let scheduler = CollectionScheduler::new(Arc::clone(&store), monitor.sources());

    let report = scheduler.run_pass();

    assert!(report.is_clean(), "collection failures: {:?}", report.failed);
    assert_eq!(store.all_latest().len(), MetricClass::ALL.len());
}
