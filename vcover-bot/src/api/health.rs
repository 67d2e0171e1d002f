//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::BotState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("vcover-bot")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Selection steps currently waiting for a reply
    pub pending_selections: usize,
    /// Free inference worker slots
    pub available_job_slots: usize,
    /// Connected event stream subscribers
    pub event_subscribers: usize,
}

/// GET /health
pub async fn health_check(State(state): State<BotState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "vcover-bot".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        pending_selections: state.router.pipeline().selections().pending_count(),
        available_job_slots: state.jobs.available_slots(),
        event_subscribers: state.event_bus.subscriber_count(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<BotState> {
    Router::new().route("/health", get(health_check))
}
