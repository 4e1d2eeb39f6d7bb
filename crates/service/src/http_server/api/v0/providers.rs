use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use common::crypto::PublicKey;
use common::records::Provider;
use common::store::MetadataStore;
use common::wallet::Address;

use crate::http_server::api::{ApiError, Authenticated};
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/register", post(register))
        .route("/encryption-key", put(publish_encryption_key))
        .route("/:wallet_address", get(get_provider))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub wallet_address: Address,
    pub hospital_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKeyRequest {
    pub wallet_address: Address,
    pub encryption_public_key: PublicKey,
}

pub async fn register(
    State(state): State<ServiceState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Provider>), ApiError> {
    let Json(req) = payload?;
    ApiError::require("hospitalName", &req.hospital_name)?;

    let provider = state
        .database()
        .register_provider(Provider {
            wallet_address: req.wallet_address,
            hospital_name: req.hospital_name.trim().to_string(),
            encryption_public_key: None,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(wallet = %provider.wallet_address, "registered provider");

    Ok((StatusCode::CREATED, Json(provider)))
}

pub async fn get_provider(
    State(state): State<ServiceState>,
    wallet: Result<Path<String>, PathRejection>,
) -> Result<Json<Provider>, ApiError> {
    let Path(wallet) = wallet?;
    let wallet: Address = wallet
        .parse()
        .map_err(|e| ApiError::Validation(format!("invalid walletAddress: {e}")))?;
    state
        .database()
        .provider(&wallet)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Provider not found".into()))
}

/// Only the provider itself may set or rotate its key
pub async fn publish_encryption_key(
    State(state): State<ServiceState>,
    session: Authenticated,
    payload: Result<Json<EncryptionKeyRequest>, JsonRejection>,
) -> Result<Json<Provider>, ApiError> {
    let Json(req) = payload?;
    session.require_wallet(&req.wallet_address)?;

    let provider = state
        .keyring()
        .publish_encryption_key(&req.wallet_address, req.encryption_public_key)
        .await?;
    Ok(Json(provider))
}
