use axum::extract::State;
use axum::{routing::get, Json, Router};
use plenum_store::path;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the document store is reachable.
    pub store_healthy: bool,
}

/// GET /health -- returns service and store health.
///
/// The store probe reads a document that never exists; a healthy backend
/// answers "not there" quickly, an unreachable one errors.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let probe = path::checks().doc("health-probe");
    let store_healthy = state.store.get(&probe).await.is_ok();

    let status = if store_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
