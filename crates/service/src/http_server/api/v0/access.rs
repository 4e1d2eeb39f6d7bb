use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use common::records::{AccessRequest, AccessRequestKey, AccessRequestStatus, FileId};
use common::store::MetadataStore;
use common::wallet::Address;

use crate::http_server::api::{ApiError, Authenticated};
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/request", post(request_access))
        .route("/approve", post(approve))
        .route("/reject", post(reject))
        .route("/pending/:patient_id", get(pending_for_patient))
        .route("/provider/:provider_wallet", get(for_provider))
        .with_state(state)
}

/// Identifies one request: which provider wants which file of which patient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestBody {
    pub cid: String,
    pub provider_wallet: Address,
    pub patient_id: String,
}

impl AccessRequestBody {
    fn validate(&self) -> Result<(), ApiError> {
        ApiError::require("cid", &self.cid)?;
        ApiError::require("patientId", &self.patient_id)
    }

    fn key(&self) -> AccessRequestKey {
        AccessRequestKey {
            cid: self.cid.clone(),
            provider_wallet: self.provider_wallet.clone(),
            patient_id: self.patient_id.clone(),
        }
    }
}

/// A provider asks for a file; the session must be that provider
pub async fn request_access(
    State(state): State<ServiceState>,
    session: Authenticated,
    payload: Result<Json<AccessRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<AccessRequest>), ApiError> {
    let Json(req) = payload?;
    req.validate()?;
    session.require_wallet(&req.provider_wallet)?;

    let db = state.database();
    if db.patient(&req.patient_id).await?.is_none() {
        return Err(ApiError::NotFound("Patient not found".into()));
    }
    if db
        .file(&FileId::new(req.cid.clone(), req.patient_id.clone()))
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("File not found for patient".into()));
    }

    let request = db
        .create_access_request(AccessRequest {
            cid: req.cid,
            provider_wallet: req.provider_wallet,
            patient_id: req.patient_id,
            status: AccessRequestStatus::Pending,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(request = %request.key(), "access requested");

    Ok((StatusCode::CREATED, Json(request)))
}

async fn decide(
    state: &ServiceState,
    session: &Authenticated,
    req: AccessRequestBody,
    status: AccessRequestStatus,
) -> Result<Json<AccessRequest>, ApiError> {
    req.validate()?;

    let patient = state
        .database()
        .patient(&req.patient_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
    session.require_wallet(&patient.wallet_address)?;

    let request = state
        .database()
        .decide_access_request(&req.key(), status)
        .await?;
    tracing::info!(request = %request.key(), status = status.as_str(), "access request decided");
    Ok(Json(request))
}

pub async fn approve(
    State(state): State<ServiceState>,
    session: Authenticated,
    payload: Result<Json<AccessRequestBody>, JsonRejection>,
) -> Result<Json<AccessRequest>, ApiError> {
    let Json(req) = payload?;
    decide(&state, &session, req, AccessRequestStatus::Approved).await
}

pub async fn reject(
    State(state): State<ServiceState>,
    session: Authenticated,
    payload: Result<Json<AccessRequestBody>, JsonRejection>,
) -> Result<Json<AccessRequest>, ApiError> {
    let Json(req) = payload?;
    decide(&state, &session, req, AccessRequestStatus::Rejected).await
}

pub async fn pending_for_patient(
    State(state): State<ServiceState>,
    patient_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<AccessRequest>>, ApiError> {
    let Path(patient_id) = patient_id?;
    let requests = state
        .database()
        .pending_requests_for_patient(&patient_id)
        .await?;
    Ok(Json(requests))
}

pub async fn for_provider(
    State(state): State<ServiceState>,
    provider_wallet: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<AccessRequest>>, ApiError> {
    let Path(provider_wallet) = provider_wallet?;
    let provider_wallet: Address = provider_wallet
        .parse()
        .map_err(|e| ApiError::Validation(format!("invalid providerWallet: {e}")))?;
    let requests = state
        .database()
        .requests_for_provider(&provider_wallet)
        .await?;
    Ok(Json(requests))
}
