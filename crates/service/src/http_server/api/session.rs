use axum::async_trait;
use axum::extract::FromRequestParts;
use http::header::AUTHORIZATION;
use http::request::Parts;

use common::auth::Claims;
use common::wallet::Address;

use super::ApiError;
use crate::ServiceState;

const BEARER_PREFIX: &str = "Bearer ";

/// A request that carried a valid bearer token
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

impl Authenticated {
    pub fn wallet(&self) -> &Address {
        &self.0.wallet_address
    }

    /// Fail with 401 unless the session belongs to `owner`
    pub fn require_wallet(&self, owner: &Address) -> Result<(), ApiError> {
        if self.wallet() != owner {
            tracing::warn!(session = %self.wallet(), %owner, "session does not own resource");
            return Err(ApiError::Unauthorized(
                "session wallet does not match the resource owner".into(),
            ));
        }
        Ok(())
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<ServiceState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        let claims = state.auth().validate_session(token)?;
        Ok(Authenticated(claims))
    }
}
