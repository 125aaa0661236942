//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    status: String,
    /// Whether a ledger transaction could be opened.
    store_reachable: bool,
    /// Live event bus subscribers (the notifier, when running).
    event_subscribers: usize,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
///
/// Opens and immediately rolls back a ledger transaction; a store that
/// cannot be reached turns the answer into `503`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Probes the ledger store and reports version, event subscribers and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Ledger store unreachable", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store_reachable = match state.store.begin().await {
        Ok(tx) => tx.rollback().await.is_ok(),
        Err(err) => {
            tracing::warn!(error = %err, "health probe could not open a transaction");
            false
        }
    };
    let (code, status) = if store_reachable {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            store_reachable,
            event_subscribers: state.event_bus.receiver_count(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
