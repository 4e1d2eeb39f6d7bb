use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use common::records::Patient;
use common::store::MetadataStore;
use common::wallet::Address;

use crate::http_server::api::ApiError;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/register", post(register))
        .route("/:patient_id", get(get_patient))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub wallet_address: Address,
    pub patient_id: String,
    pub name: String,
}

/// Registration is open; the wallet proves itself later when it signs in
pub async fn register(
    State(state): State<ServiceState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let Json(req) = payload?;
    ApiError::require("patientId", &req.patient_id)?;
    ApiError::require("name", &req.name)?;

    let patient = state
        .database()
        .register_patient(Patient {
            wallet_address: req.wallet_address,
            patient_id: req.patient_id.trim().to_string(),
            name: req.name.trim().to_string(),
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(
        patient_id = %patient.patient_id,
        wallet = %patient.wallet_address,
        "registered patient"
    );

    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<ServiceState>,
    patient_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Patient>, ApiError> {
    let Path(patient_id) = patient_id?;
    state
        .database()
        .patient(&patient_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))
}
