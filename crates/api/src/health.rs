use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::AppState;

/// Current application version from Cargo.toml
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

pub fn mark_server_start() {
    SERVER_START.get_or_init(Instant::now);
}

fn get_uptime() -> Duration {
    SERVER_START.get().map(|start| start.elapsed()).unwrap_or_default()
}

/// Liveness check - the process is up
/// GET /health
pub async fn liveness() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": CURRENT_VERSION,
        "uptime_seconds": get_uptime().as_secs(),
    }))
}

/// Readiness check - the metadata database answers
/// GET /health/ready
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.metadata.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": [{ "name": "database", "status": "healthy" }]
            })),
        ),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "checks": [{ "name": "database", "status": "unhealthy" }]
                })),
            )
        }
    }
}
