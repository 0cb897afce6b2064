//! Bounded in-memory history, one ring per metric class.
//!
//! One writer (the collection scheduler) appends while any number of query
//! handlers read. Every operation holds the store lock only for the
//! data-structure access itself; range filtering runs on a copy taken under
//! the lock. Records are kept behind `Arc`, so those copies are reference
//! bumps and callers can never reach stored state mutably.

mod ring;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::monitor::{MetricClass, MetricRecord};

pub use ring::RingBuffer;

/// Records kept per class when nothing else is configured
pub const DEFAULT_CAPACITY: usize = 3600;

/// Time window and tail limit for [`TimeSeriesStore::range`].
///
/// Both bounds are inclusive. Only a positive `limit` truncates; zero or a
/// negative value means "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl RangeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            limit: None,
        }
    }

    pub fn last(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn is_time_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    fn admits(&self, record: &MetricRecord) -> bool {
        if !self.is_time_bounded() {
            return true;
        }
        let Some(ts) = record.timestamp else {
            return false;
        };
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts <= end)
    }

    fn tail_len(&self) -> Option<usize> {
        self.limit.filter(|&l| l > 0).map(|l| l as usize)
    }
}

pub struct TimeSeriesStore {
    series: Mutex<[RingBuffer<Arc<MetricRecord>>; 5]>,
    capacity: usize,
}

impl TimeSeriesStore {
    /// `capacity` records per class; values below 1 are raised to 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            series: Mutex::new(std::array::from_fn(|_| RingBuffer::new(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `record` to `class`. Returns false, touching nothing, when the class is unknown.
    ///
    /// An unstamped record gets the current time.
    pub fn save(&self, class: &str, mut record: MetricRecord) -> bool {
        let Ok(class) = class.parse::<MetricClass>() else {
            debug!(class, "ignoring record for unknown class");
            return false;
        };
        if record.timestamp.is_none() {
            record.timestamp = Some(Utc::now());
        }
        let record = Arc::new(record);

        let evicted = self.series.lock()[class.index()].push(record);
        if evicted.is_some() {
            debug!(class = %class, capacity = self.capacity, "evicted oldest record");
        }
        true
    }

    /// Most recent record of `class`; `None` when the class is unknown or empty
    pub fn latest(&self, class: &str) -> Option<Arc<MetricRecord>> {
        let class = class.parse::<MetricClass>().ok()?;
        self.series.lock()[class.index()].back().cloned()
    }

    /// Records of `class` inside the query window, oldest first.
    ///
    /// Unknown classes yield an empty list. With a positive limit only the
    /// newest `limit` matching records are returned.
    pub fn range(&self, class: &str, query: RangeQuery) -> Vec<Arc<MetricRecord>> {
        let Ok(class) = class.parse::<MetricClass>() else {
            return Vec::new();
        };

        let snapshot: Vec<Arc<MetricRecord>> =
            self.series.lock()[class.index()].iter().cloned().collect();

        let mut matching: Vec<Arc<MetricRecord>> = if query.is_time_bounded() {
            snapshot.into_iter().filter(|r| query.admits(r)).collect()
        } else {
            snapshot
        };

        if let Some(n) = query.tail_len() {
            let excess = matching.len().saturating_sub(n);
            matching.drain(..excess);
        }
        matching
    }

    /// Latest record of every class that has one; empty classes are left out
    pub fn all_latest(&self) -> BTreeMap<MetricClass, Arc<MetricRecord>> {
        let series = self.series.lock();
        MetricClass::ALL
            .iter()
            .filter_map(|class| series[class.index()].back().map(|r| (*class, Arc::clone(r))))
            .collect()
    }

    /// Empties `class`, or every class when `None`. Unknown classes are ignored.
    pub fn clear(&self, class: Option<&str>) {
        match class {
            Some(key) => {
                if let Ok(class) = key.parse::<MetricClass>() {
                    self.series.lock()[class.index()].clear();
                    debug!(class = %class, "cleared history");
                }
            }
            None => {
                for class in MetricClass::ALL {
                    self.series.lock()[class.index()].clear();
                }
                debug!("cleared all history");
            }
        }
    }

    /// Current record count for every known class, zero included
    pub fn stats(&self) -> BTreeMap<MetricClass, usize> {
        let series = self.series.lock();
        MetricClass::ALL
            .iter()
            .map(|class| (*class, series[class.index()].len()))
            .collect()
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MetricPayload;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn value_record(value: i64) -> MetricRecord {
        let mut fields = BTreeMap::new();
        fields.insert("value".to_string(), json!(value));
        MetricRecord::unstamped(MetricPayload::Fields(fields))
    }

    fn record_at(value: i64, ts: DateTime<Utc>) -> MetricRecord {
        MetricRecord {
            timestamp: Some(ts),
            ..value_record(value)
        }
    }

    fn value_of(record: &MetricRecord) -> i64 {
        match &record.payload {
            MetricPayload::Fields(fields) => fields["value"].as_i64().unwrap(),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    /// Ten cpu records stamped t0..t9, one second apart, valued 0..9
    fn ten_cpu_records() -> TimeSeriesStore {
        let store = TimeSeriesStore::new(100);
        for i in 0..10 {
            assert!(store.save("cpu", record_at(i, base_time() + Duration::seconds(i))));
        }
        store
    }

    #[test]
    fn test_capacity_keeps_most_recent_values() {
        for capacity in [1usize, 2, 3, 7] {
            let store = TimeSeriesStore::new(capacity);
            let n = capacity as i64 * 3 + 1;
            for v in 0..n {
                store.save("memory", value_record(v));
            }
            let values: Vec<i64> = store
                .range("memory", RangeQuery::all())
                .iter()
                .map(|r| value_of(r))
                .collect();
            let expected: Vec<i64> = (n - capacity as i64..n).collect();
            assert_eq!(values, expected);
            assert_eq!(store.stats()[&MetricClass::Memory], capacity);
        }
    }

    #[test]
    fn test_oversized_capacity_does_not_preallocate() {
        let store = TimeSeriesStore::new(usize::MAX / 8);
        assert!(store.save("cpu", value_record(1)));
        assert_eq!(store.capacity(), usize::MAX / 8);
        assert_eq!(store.stats()[&MetricClass::Cpu], 1);
    }

    #[test]
    fn test_save_unknown_class_changes_nothing() {
        let store = TimeSeriesStore::new(10);
        store.save("cpu", value_record(1));
        store.save("disk", value_record(2));
        let before = store.stats();

        assert!(!store.save("gpu", value_record(3)));
        assert!(!store.save("", value_record(4)));

        assert_eq!(store.stats(), before);
    }

    #[test]
    fn test_save_stamps_missing_timestamp() {
        let store = TimeSeriesStore::new(10);
        let before = Utc::now();
        store.save("network", value_record(1));
        let after = Utc::now();

        let ts = store.latest("network").unwrap().timestamp.unwrap();
        assert!(ts >= before && ts <= after);
    }

    #[test]
    fn test_save_keeps_existing_timestamp() {
        let store = TimeSeriesStore::new(10);
        store.save("network", record_at(1, base_time()));
        assert_eq!(store.latest("network").unwrap().timestamp, Some(base_time()));
    }

    #[test]
    fn test_latest_returns_last_saved() {
        let store = TimeSeriesStore::new(10);
        for v in 1..=4 {
            store.save("disk", value_record(v));
        }
        assert_eq!(value_of(&store.latest("disk").unwrap()), 4);
    }

    #[test]
    fn test_latest_absent_for_empty_or_unknown() {
        let store = TimeSeriesStore::new(10);
        assert!(store.latest("cpu").is_none());
        assert!(store.latest("bogus").is_none());
    }

    #[test]
    fn test_latest_is_a_snapshot() {
        let store = TimeSeriesStore::new(10);
        store.save("cpu", value_record(1));

        let mut copy = (*store.latest("cpu").unwrap()).clone();
        if let MetricPayload::Fields(fields) = &mut copy.payload {
            fields.insert("value".to_string(), json!(99));
        }

        assert_eq!(value_of(&store.latest("cpu").unwrap()), 1);
    }

    #[test]
    fn test_range_inclusive_window() {
        let store = ten_cpu_records();
        let query = RangeQuery::between(
            base_time() + Duration::seconds(3),
            base_time() + Duration::seconds(6),
        );
        let values: Vec<i64> = store.range("cpu", query).iter().map(|r| value_of(r)).collect();
        assert_eq!(values, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_range_open_ended_bounds() {
        let store = ten_cpu_records();

        let from = RangeQuery {
            start: Some(base_time() + Duration::seconds(8)),
            ..RangeQuery::default()
        };
        let values: Vec<i64> = store.range("cpu", from).iter().map(|r| value_of(r)).collect();
        assert_eq!(values, vec![8, 9]);

        let until = RangeQuery {
            end: Some(base_time() + Duration::seconds(1)),
            ..RangeQuery::default()
        };
        let values: Vec<i64> = store.range("cpu", until).iter().map(|r| value_of(r)).collect();
        assert_eq!(values, vec![0, 1]);
    }

    #[test]
    fn test_range_limit_keeps_tail() {
        let store = ten_cpu_records();
        let values: Vec<i64> = store
            .range("cpu", RangeQuery::last(5))
            .iter()
            .map(|r| value_of(r))
            .collect();
        assert_eq!(values, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_range_limit_applies_after_filter() {
        let store = ten_cpu_records();
        let query = RangeQuery {
            limit: Some(2),
            ..RangeQuery::between(base_time(), base_time() + Duration::seconds(4))
        };
        let values: Vec<i64> = store.range("cpu", query).iter().map(|r| value_of(r)).collect();
        assert_eq!(values, vec![3, 4]);
    }

    #[test]
    fn test_range_non_positive_limit_means_unlimited() {
        let store = ten_cpu_records();
        assert_eq!(store.range("cpu", RangeQuery::last(0)).len(), 10);
        assert_eq!(store.range("cpu", RangeQuery::last(-3)).len(), 10);
        assert_eq!(store.range("cpu", RangeQuery::last(50)).len(), 10);
    }

    #[test]
    fn test_range_unknown_class_is_empty() {
        let store = ten_cpu_records();
        assert!(store.range("cpus", RangeQuery::all()).is_empty());
    }

    #[test]
    fn test_all_latest_omits_empty_classes() {
        let store = TimeSeriesStore::new(10);
        store.save("cpu", value_record(1));
        store.save("cpu", value_record(2));
        store.save("process", value_record(3));

        let latest = store.all_latest();
        assert_eq!(latest.len(), 2);
        assert_eq!(value_of(&latest[&MetricClass::Cpu]), 2);
        assert_eq!(value_of(&latest[&MetricClass::Process]), 3);
        assert!(!latest.contains_key(&MetricClass::Memory));
    }

    #[test]
    fn test_clear_single_class() {
        let store = TimeSeriesStore::new(10);
        for class in MetricClass::ALL {
            store.save(class.as_str(), value_record(1));
        }

        store.clear(Some("cpu"));

        let stats = store.stats();
        assert_eq!(stats[&MetricClass::Cpu], 0);
        for class in &MetricClass::ALL[1..] {
            assert_eq!(stats[class], 1);
        }
    }

    #[test]
    fn test_clear_all_and_unknown() {
        let store = TimeSeriesStore::new(10);
        for class in MetricClass::ALL {
            store.save(class.as_str(), value_record(1));
        }

        store.clear(Some("nope"));
        assert!(store.stats().values().all(|&n| n == 1));

        store.clear(None);
        assert!(store.stats().values().all(|&n| n == 0));
    }

    #[test]
    fn test_stats_lists_every_class() {
        let store = TimeSeriesStore::default();
        let stats = store.stats();
        assert_eq!(stats.len(), MetricClass::ALL.len());
        assert!(stats.values().all(|&n| n == 0));
        assert_eq!(store.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_capacity_three_scenario() {
        let store = TimeSeriesStore::new(3);
        for v in 1..=5 {
            store.save("cpu", value_record(v));
        }
        let values: Vec<i64> = store
            .range("cpu", RangeQuery::all())
            .iter()
            .map(|r| value_of(r))
            .collect();
        assert_eq!(values, vec![3, 4, 5]);
        assert_eq!(store.stats()[&MetricClass::Cpu], 3);
    }
}
