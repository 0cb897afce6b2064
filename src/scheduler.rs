//! Periodic collection into the store.
//!
//! A single background thread owns every write: it wakes on a fixed tick,
//! runs one collection pass over all sources, and goes back to waiting.
//! Passes never overlap; a pass that overruns the interval delays the next
//! tick instead of stacking another one behind it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::error::{CollectError, SchedulerError};
use crate::monitor::{MetricClass, MetricRecord, SharedSource};
use crate::store::TimeSeriesStore;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one collection pass
#[derive(Debug, Default)]
pub struct PassReport {
    pub saved: Vec<MetricClass>,
    pub failed: Vec<CollectError>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs passes over a fixed set of sources; cloned into the scheduler thread
#[derive(Clone)]
struct Collector {
    store: Arc<TimeSeriesStore>,
    /// Class read once up front so a stuck source can still be named
    sources: Vec<(MetricClass, SharedSource)>,
    timeout: Option<Duration>,
}

impl Collector {
    fn run_pass(&self) -> PassReport {
        let started = Instant::now();
        let mut report = PassReport::default();

        for (class, source) in &self.sources {
            match self.collect_one(*class, source) {
                Ok(record) => {
                    if self.store.save(class.as_str(), record) {
                        report.saved.push(*class);
                    }
                }
                Err(e) => {
                    warn!(class = %class, error = %e, "collection failed, skipping this tick");
                    report.failed.push(e);
                }
            }
        }

        debug!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collection pass finished"
        );
        report
    }

    fn collect_one(&self, class: MetricClass, source: &SharedSource) -> Result<MetricRecord, CollectError> {
        match self.timeout {
            None => {
                let mut guard = source.lock();
                catch_collect(class, || guard.collect())
            }
            Some(timeout) => Self::collect_with_timeout(class, source, timeout),
        }
    }

    /// Runs the source on a helper thread so a hung OS call only costs this class its sample.
    fn collect_with_timeout(
        class: MetricClass,
        source: &SharedSource,
        timeout: Duration,
    ) -> Result<MetricRecord, CollectError> {
        let (tx, rx) = bounded(1);
        let worker_source = Arc::clone(source);
        let spawned = thread::Builder::new()
            .name(format!("collect-{}", class))
            .spawn(move || {
                // A source still stuck in an earlier call keeps its lock
                let result = match worker_source.try_lock_for(timeout) {
                    Some(mut guard) => catch_collect(class, || guard.collect()),
                    None => Err(CollectError::Busy { class }),
                };
                // The scheduler may have given up on us already
                let _ = tx.send(result);
            });

        if let Err(e) = spawned {
            return Err(CollectError::Unavailable {
                class,
                reason: format!("failed to spawn collector thread: {}", e),
            });
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => Err(CollectError::Timeout { class, timeout }),
        }
    }
}

fn catch_collect<F>(class: MetricClass, f: F) -> Result<MetricRecord, CollectError>
where
    F: FnOnce() -> Result<MetricRecord, CollectError>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or(Err(CollectError::Panicked { class }))
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Drives periodic collection of every source into the store.
///
/// `Stopped -> Running -> Stopped`; `stop()` waits for an in-flight pass.
pub struct CollectionScheduler {
    collector: Collector,
    interval: Duration,
    running: Option<Running>,
}

impl CollectionScheduler {
    pub fn new(store: Arc<TimeSeriesStore>, sources: Vec<SharedSource>) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| {
                let class = source.lock().class();
                (class, source)
            })
            .collect();

        Self {
            collector: Collector {
                store,
                sources,
                timeout: Some(DEFAULT_COLLECT_TIMEOUT),
            },
            interval: DEFAULT_INTERVAL,
            running: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Per-source timeout; `None` calls sources inline with no bound
    pub fn with_collect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.collector.timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// One pass over every source, on the caller's thread
    pub fn run_pass(&self) -> PassReport {
        self.collector.run_pass()
    }

    /// Collects once synchronously, then starts the periodic thread
    pub fn start(&mut self) -> Result<PassReport, SchedulerError> {
        if self.running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let first = self.collector.run_pass();

        let (stop_tx, stop_rx) = bounded(1);
        let collector = self.collector.clone();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("collection-scheduler".to_string())
            .spawn(move || Self::run_loop(collector, interval, stop_rx))?;

        self.running = Some(Running { stop_tx, handle });
        info!(interval_secs = interval.as_secs_f64(), "collection scheduler started");
        Ok(first)
    }

    fn run_loop(collector: Collector, interval: Duration, stop_rx: Receiver<()>) {
        let ticker = tick(interval);
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {
                    // Both may be ready at once; stopping wins
                    if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                        break;
                    }
                    collector.run_pass();
                }
            }
        }
        debug!("collection scheduler loop exited");
    }

    /// Prevents further passes and waits for the current one to finish. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.stop_tx.try_send(());
        drop(running.stop_tx);

        if running.handle.join().is_err() {
            error!("collection scheduler thread panicked");
        }
        info!("collection scheduler stopped");
    }
}

impl Drop for CollectionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
