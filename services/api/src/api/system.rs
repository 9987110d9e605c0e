//! Health endpoint.
//!
//! # Key invariants and assumptions
//! - The probe is a single cheap round-trip to the store with no side effects.
//! - It is unauthenticated and reveals nothing beyond up/down.
use crate::api::error::{ApiError, api_unavailable};
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "system",
    responses(
        (status = 200, description = "Store reachable", body = HealthStatus),
        (status = 503, description = "Store unreachable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn healthz(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    if let Err(err) = state.store.health_check().await {
        tracing::error!(error = ?err, backend = state.store.backend_name(), "health check failed");
        return Err(api_unavailable("database unavailable"));
    }
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
    }))
}
