//! Patient directory endpoints

use assent_api::{
    ApiError, ApiResponse,
    requests::EnrollPatientRequest,
    responses::{PatientListResponse, PatientResponse},
};
use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use crate::state::AppState;

pub async fn list_patients(State(state): State<AppState>) -> Json<ApiResponse<PatientListResponse>> {
    let patients = state
        .directory
        .patients()
        .await
        .into_iter()
        .map(PatientResponse::from)
        .collect();
    Json(ApiResponse::new(PatientListResponse { patients }))
}

/// Add a patient under a freshly generated PIN
pub async fn enroll_patient(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<PatientResponse>), ApiError> {
    let request: EnrollPatientRequest = serde_json::from_str(&body)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("patient name must not be empty"));
    }

    let record = state.directory.enroll(name).await;
    info!("Enrolled patient {} with PIN {}", record.name, record.pin);
    Ok((StatusCode::CREATED, Json(PatientResponse::from(record))))
}
