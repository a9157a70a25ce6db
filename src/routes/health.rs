use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/database", get(database_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.cache();
    let cache_healthy = match cache.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(backend = cache.name(), error = %e, "Cache health check failed");
            false
        }
    };
    let cached_keys = cache.memory().and_then(|memory| memory.len().ok());
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "catalog": {
            "items": state.store().count_items(),
        },
        "cache": {
            "backend": cache.name(),
            "healthy": cache_healthy,
            "keys": cached_keys,
        },
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Ready once the store answers reads.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().get_topic("__readiness_probe__") {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn database_health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let healthy = state.store().get_topic("__health_check__").is_ok();
    let latency_us = start.elapsed().as_micros() as u64;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "healthy": healthy,
            "latencyUs": latency_us,
            "sizeOnDiskBytes": state.store().raw_db().size_on_disk().ok(),
        })),
    )
}
