//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when no provider is configured
    pub status: String,
    /// Module name ("melody-detect")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub providers: usize,
    /// Requests currently held in memory
    pub active_requests: usize,
    /// Jobs held in memory, keyed by state
    pub jobs: BTreeMap<String, usize>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let providers = state.orchestrator.registry().len();
    let tracker = state.orchestrator.tracker();
    let active_requests = tracker.request_count().await;
    let jobs = tracker
        .job_counts()
        .await
        .into_iter()
        .map(|(job_state, count)| (job_state.to_string(), count))
        .collect();

    Json(HealthResponse {
        status: if providers > 0 { "ok" } else { "degraded" }.to_string(),
        module: "melody-detect".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        providers,
        active_requests,
        jobs,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<crate::AppState> {
    Router::new().route("/health", get(health_check))
}
