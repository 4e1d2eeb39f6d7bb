use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::wallet::Address;

use crate::http_server::api::ApiError;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/request-nonce", post(request_nonce))
        .route("/verify", post(verify))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    pub wallet_address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub wallet_address: Address,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub token: String,
    pub wallet_address: Address,
    pub expires_at: DateTime<Utc>,
}

pub async fn request_nonce(
    State(state): State<ServiceState>,
    payload: Result<Json<NonceRequest>, JsonRejection>,
) -> Result<Json<NonceResponse>, ApiError> {
    let Json(req) = payload?;
    let nonce = state.auth().request_challenge(&req.wallet_address).await?;
    Ok(Json(NonceResponse { nonce }))
}

pub async fn verify(
    State(state): State<ServiceState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(req) = payload?;
    ApiError::require("signature", &req.signature)?;

    let session = state
        .auth()
        .verify(&req.wallet_address, &req.signature)
        .await?;
    Ok(Json(VerifyResponse {
        token: session.token,
        wallet_address: session.wallet_address,
        expires_at: session.expires_at,
    }))
}
