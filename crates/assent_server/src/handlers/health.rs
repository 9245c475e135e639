//! Health check endpoint

use axum::Json;
use axum::extract::State;
use assent_api::responses::HealthResponse;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.router.registry();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: assent_api::API_VERSION.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connections: state.router.connection_count(),
        registered_patients: registry.len(),
        answer_delivery: state.router.delivery(),
    })
}
