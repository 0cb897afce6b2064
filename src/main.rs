use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use hostmon::monitor::ProcessSortKey;
use hostmon::server::{self, AppState};
use hostmon::{CollectionScheduler, Config, ConfigOverrides, SystemMonitor, TimeSeriesStore};

#[derive(Parser)]
#[command(name = "hostmon")]
#[command(about = "Samples host metrics into bounded history and serves them over HTTP", long_about = None)]
struct Cli {
    /// Config file (default: ./hostmon.ini, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Records kept per metric class
    #[arg(long)]
    capacity: Option<usize>,

    /// Seconds between collection passes
    #[arg(short, long)]
    interval: Option<u64>,

    /// Seconds a single source may take before its sample is skipped
    #[arg(long)]
    collect_timeout: Option<u64>,

    /// Address the query API listens on
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Processes kept in each stored process snapshot
    #[arg(long)]
    process_limit: Option<usize>,

    /// Ordering for stored process snapshots (cpu or memory)
    #[arg(long)]
    process_sort: Option<ProcessSortKey>,

    /// Log filter, e.g. "info" or "hostmon=debug" (RUST_LOG wins)
    #[arg(long)]
    log: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            capacity: self.capacity,
            interval_secs: self.interval,
            collect_timeout_secs: self.collect_timeout,
            bind: self.bind,
            process_limit: self.process_limit,
            process_sort: self.process_sort,
            log_filter: self.log.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())
        .and_then(|config| config.apply(cli.overrides()))
        .context("invalid configuration")?;

    hostmon::logging::init(&config.log_filter)
        .context("failed to initialise logging")?;

    info!(
        capacity = config.capacity,
        interval_secs = config.interval.as_secs(),
        "hostmon starting"
    );

    let store = Arc::new(TimeSeriesStore::new(config.capacity));
    let monitor = Arc::new(SystemMonitor::new(config.process_limit, config.process_sort));

    let mut scheduler = CollectionScheduler::new(Arc::clone(&store), monitor.sources())
        .with_interval(config.interval)
        .with_collect_timeout(Some(config.collect_timeout));

    let first = scheduler.start().context("failed to start collection scheduler")?;
    if !first.is_clean() {
        warn!(failed = first.failed.len(), "initial collection pass had failures");
    }

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.notify_one())
            .context("failed to install Ctrl-C handler")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    let state =
        AppState::new(Arc::clone(&store), monitor).with_collect_timeout(config.collect_timeout);
    let served = runtime.block_on(server::serve(state, config.bind, async move {
        shutdown.notified().await;
        info!("received shutdown signal");
    }));

    // Cleanup
    scheduler.stop();
    info!(stats = ?store.stats(), "hostmon shutting down");

    served.with_context(|| format!("query API failed on {}", config.bind))
}
