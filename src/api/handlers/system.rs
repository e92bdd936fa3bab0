use axum::{extract::State, Json};

use crate::api::state::AppState;
use crate::api::types::HealthResponse;

/// GET /healthz
pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}
