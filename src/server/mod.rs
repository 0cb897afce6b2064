//! HTTP query API
//!
//! Thin translation layer: requests map onto store reads and on-demand
//! source calls. The store and sources are injected through [`AppState`].
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(store, Arc::new(SystemMonitor::default()));
//! server::serve(state, "127.0.0.1:8000".parse()?, shutdown_signal).await?;
//! ```

mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::monitor::SystemMonitor;
use crate::scheduler::DEFAULT_COLLECT_TIMEOUT;
use crate::store::TimeSeriesStore;

pub use handlers::*;

pub const API_PREFIX: &str = "/api/v1";

/// Errors surfaced to HTTP clients as `{"detail": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Collector unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TimeSeriesStore>,
    pub monitor: Arc<SystemMonitor>,
    /// Bound on waiting for a source another caller is still collecting from
    pub collect_timeout: Duration,
    started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<TimeSeriesStore>, monitor: Arc<SystemMonitor>) -> Self {
        Self {
            store,
            monitor,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            started_at: Instant::now(),
        }
    }

    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/metrics/current", get(current_metrics))
        .route("/metrics/latest", get(latest_metrics))
        .route("/metrics/cpu", get(cpu_history))
        .route("/metrics/memory", get(memory_history))
        .route("/metrics/disk", get(disk_history))
        .route("/metrics/network", get(network_history))
        .route("/metrics/process", get(process_history))
        .route("/metrics/processes", get(top_processes))
        .route("/storage/stats", get(storage_stats))
        .route("/storage", axum::routing::delete(clear_storage));

    Router::new()
        .route("/", get(root))
        .nest(API_PREFIX, api)
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "query API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("query API stopped");
    Ok(())
}
