//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;

use super::super::state::AppState;
use super::super::types::HealthResponse;

/// Health check endpoint
///
/// Pings the ledger store on every call.
/// - Healthy: 200 OK + `{status: "ok", ...}`
/// - Unhealthy: 503 Service Unavailable + `{status: "unavailable", ...}`
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(backend = state.store.name(), error = %e, "[HEALTH] store ping failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            backend: state.store.name().to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }),
    )
}
