//! HTTP request handlers
//!
//! Axum handlers for the query API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, API_PREFIX};
use crate::config::MAX_PROCESS_LIMIT;
use crate::error::CollectError;
use crate::monitor::{
    MetricClass, MetricRecord, MetricSource, ProcessInfo, ProcessSortKey, DEFAULT_PROCESS_LIMIT,
};
use crate::store::RangeQuery;

pub const DEFAULT_HISTORY_LIMIT: i64 = 100;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct CurrentMetrics {
    pub timestamp: DateTime<Utc>,
    pub cpu: MetricRecord,
    pub memory: MetricRecord,
    pub disk: MetricRecord,
    pub network: MetricRecord,
}

#[derive(Debug, Serialize)]
pub struct StorageStats {
    pub capacity: usize,
    pub counts: BTreeMap<MetricClass, usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl HistoryParams {
    fn into_range(self) -> Result<RangeQuery, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }
        Ok(RangeQuery {
            start: self.start,
            end: self.end,
            limit: Some(limit),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessParams {
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearParams {
    pub class: Option<String>,
}

fn bad_query(rejection: QueryRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}

/// Service banner
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "hostmon system monitoring API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": format!("{}/health", API_PREFIX),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("no such endpoint".to_string())
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Collects from `source` unless it stays locked past `timeout`
fn collect_bounded<S: MetricSource>(
    class: MetricClass,
    source: &Mutex<S>,
    timeout: Duration,
) -> Result<MetricRecord, CollectError> {
    let mut guard = source
        .try_lock_for(timeout)
        .ok_or(CollectError::Busy { class })?;
    guard.collect()
}

/// Fresh cpu/memory/disk/network snapshot, collected for this request only
pub async fn current_metrics(State(state): State<AppState>) -> Result<Json<CurrentMetrics>, ApiError> {
    let monitor = Arc::clone(&state.monitor);
    let timeout = state.collect_timeout;
    let collected = tokio::task::spawn_blocking(move || {
        Ok::<_, CollectError>(CurrentMetrics {
            timestamp: Utc::now(),
            cpu: collect_bounded(MetricClass::Cpu, &monitor.cpu, timeout)?,
            memory: collect_bounded(MetricClass::Memory, &monitor.memory, timeout)?,
            disk: collect_bounded(MetricClass::Disk, &monitor.disk, timeout)?,
            network: collect_bounded(MetricClass::Network, &monitor.network, timeout)?,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    collected
        .map(Json)
        .map_err(|e| ApiError::Unavailable(e.to_string()))
}

/// Latest stored record per class
pub async fn latest_metrics(
    State(state): State<AppState>,
) -> Json<BTreeMap<MetricClass, Arc<MetricRecord>>> {
    Json(state.store.all_latest())
}

async fn history(
    state: AppState,
    class: MetricClass,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Arc<MetricRecord>>>, ApiError> {
    let Query(params) = params.map_err(bad_query)?;
    let range = params.into_range()?;
    Ok(Json(state.store.range(class.as_str(), range)))
}

pub async fn cpu_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Arc<MetricRecord>>>, ApiError> {
    history(state, MetricClass::Cpu, params).await
}

pub async fn memory_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Arc<MetricRecord>>>, ApiError> {
    history(state, MetricClass::Memory, params).await
}

pub async fn disk_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Arc<MetricRecord>>>, ApiError> {
    history(state, MetricClass::Disk, params).await
}

pub async fn network_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Arc<MetricRecord>>>, ApiError> {
    history(state, MetricClass::Network, params).await
}

pub async fn process_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<Arc<MetricRecord>>>, ApiError> {
    history(state, MetricClass::Process, params).await
}

/// Live top-N process listing
pub async fn top_processes(
    State(state): State<AppState>,
    params: Result<Query<ProcessParams>, QueryRejection>,
) -> Result<Json<Vec<ProcessInfo>>, ApiError> {
    let Query(params) = params.map_err(bad_query)?;

    let limit = params.limit.unwrap_or(DEFAULT_PROCESS_LIMIT);
    if !(1..=MAX_PROCESS_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_PROCESS_LIMIT
        )));
    }
    let sort_by = match params.sort_by.as_deref() {
        Some(raw) => raw
            .parse::<ProcessSortKey>()
            .map_err(|e| ApiError::Validation(e.to_string()))?,
        None => ProcessSortKey::Cpu,
    };

    let monitor = Arc::clone(&state.monitor);
    let timeout = state.collect_timeout;
    let processes = tokio::task::spawn_blocking(move || {
        monitor
            .process
            .try_lock_for(timeout)
            .map(|mut guard| guard.top(limit, sort_by))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    processes.map(Json).ok_or_else(|| {
        ApiError::Unavailable(
            CollectError::Busy {
                class: MetricClass::Process,
            }
            .to_string(),
        )
    })
}

pub async fn storage_stats(State(state): State<AppState>) -> Json<StorageStats> {
    Json(StorageStats {
        capacity: state.store.capacity(),
        counts: state.store.stats(),
    })
}

/// Clears one class (`?class=cpu`) or everything; unknown classes are a no-op
pub async fn clear_storage(
    State(state): State<AppState>,
    params: Result<Query<ClearParams>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let Query(params) = params.map_err(bad_query)?;
    state.store.clear(params.class.as_deref());
    Ok(StatusCode::NO_CONTENT)
}
