//! Liveness/readiness probes and the Prometheus scrape endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    name: &'static str,
    version: &'static str,
}

pub async fn health_handler() -> impl IntoResponse {
    let info = core_config::app_info!();
    Json(HealthBody {
        status: "ok",
        name: info.name,
        version: info.version,
    })
}

/// Checks the database connection; used by orchestrators to gate traffic.
pub async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let info = core_config::app_info!();
    match database::postgres::check_health(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(HealthBody {
            status: "ready",
            name: info.name,
            version: info.version,
        }))
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
