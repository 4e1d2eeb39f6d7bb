use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde::{Deserialize, Serialize};

use common::crypto::WrappedKey;
use common::records::{FileId, FileRecord, NewFile, Patient};
use common::store::MetadataStore;
use common::wallet::Address;

use crate::http_server::api::{ApiError, Authenticated};
use crate::ServiceState;

/// File records carry wrapped keys; nothing along the way should keep a copy
async fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/register", post(register))
        .route("/wrap-key", post(wrap_key))
        .route("/revoke-key", post(revoke_key))
        .route("/:patient_id", get(list_files))
        .layer(middleware::map_response(no_store))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapKeyRequest {
    pub cid: String,
    pub patient_id: String,
    pub provider_wallet: Address,
    pub wrapped_key: WrappedKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeKeyRequest {
    pub patient_id: String,
    pub provider_wallet: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeKeyResponse {
    pub removed: usize,
}

/// Load the patient and make sure the session is theirs
async fn owned_patient(
    state: &ServiceState,
    session: &Authenticated,
    patient_id: &str,
) -> Result<Patient, ApiError> {
    let patient = state
        .database()
        .patient(patient_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
    session.require_wallet(&patient.wallet_address)?;
    Ok(patient)
}

/// A provider's copy must be an x25519 wrap for a registered provider
async fn require_provider_wrap(
    state: &ServiceState,
    provider: &Address,
    wrapped: &WrappedKey,
) -> Result<(), ApiError> {
    if !matches!(wrapped, WrappedKey::Recipient(_)) {
        return Err(ApiError::Validation(format!(
            "wrapped key for provider {provider} must be an x25519 wrap"
        )));
    }
    if state.database().provider(provider).await?.is_none() {
        return Err(ApiError::NotFound("Provider not found".into()));
    }
    Ok(())
}

fn validate_cid(cid: &str) -> Result<(), ApiError> {
    ApiError::require("cid", cid)?;
    if !cid.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::Validation(format!("invalid cid: {cid:?}")));
    }
    Ok(())
}

pub async fn register(
    State(state): State<ServiceState>,
    session: Authenticated,
    payload: Result<Json<NewFile>, JsonRejection>,
) -> Result<(StatusCode, Json<FileRecord>), ApiError> {
    let Json(file) = payload?;
    validate_cid(&file.cid)?;
    ApiError::require("patientId", &file.patient_id)?;
    ApiError::require("fileName", &file.file_name)?;
    if !matches!(file.encrypted_key_for_patient, WrappedKey::Passphrase(_)) {
        return Err(ApiError::Validation(
            "encryptedKeyForPatient must be a passphrase wrap".into(),
        ));
    }

    owned_patient(&state, &session, &file.patient_id).await?;
    for (provider, wrapped) in &file.wrapped_keys {
        require_provider_wrap(&state, provider, wrapped).await?;
    }
    let record = state.keyring().register_file(file).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn wrap_key(
    State(state): State<ServiceState>,
    session: Authenticated,
    payload: Result<Json<WrapKeyRequest>, JsonRejection>,
) -> Result<Json<FileRecord>, ApiError> {
    let Json(req) = payload?;
    validate_cid(&req.cid)?;

    owned_patient(&state, &session, &req.patient_id).await?;
    require_provider_wrap(&state, &req.provider_wallet, &req.wrapped_key).await?;

    let id = FileId::new(req.cid, req.patient_id);
    state
        .keyring()
        .store_wrapped_key(&id, &req.provider_wallet, req.wrapped_key)
        .await?;

    state
        .database()
        .file(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("File not found".into()))
}

pub async fn revoke_key(
    State(state): State<ServiceState>,
    session: Authenticated,
    payload: Result<Json<RevokeKeyRequest>, JsonRejection>,
) -> Result<Json<RevokeKeyResponse>, ApiError> {
    let Json(req) = payload?;
    owned_patient(&state, &session, &req.patient_id).await?;

    let removed = state
        .keyring()
        .revoke(&req.patient_id, &req.provider_wallet)
        .await?;
    Ok(Json(RevokeKeyResponse { removed }))
}

/// Any signed-in wallet may list; providers need the records to find their wraps
pub async fn list_files(
    State(state): State<ServiceState>,
    _session: Authenticated,
    patient_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let Path(patient_id) = patient_id?;
    let files = state.database().files_for_patient(&patient_id).await?;
    Ok(Json(files))
}
