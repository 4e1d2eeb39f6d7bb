use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use common::auth::AuthError;
use common::keyring::KeyringError;
use common::store::StoreError;

/// Every failure an API handler can return
///
/// The body is always `{"message": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// The server is missing something it needs; not the caller's fault
    #[error("server misconfigured: {0}")]
    Configuration(String),
    #[error("internal server error")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Configuration(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Reject empty or whitespace-only required fields
    pub fn require(field: &str, value: &str) -> Result<(), ApiError> {
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!("{field} is required")));
        }
        Ok(())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(detail) => tracing::error!(%detail, "request failed"),
            ApiError::Configuration(detail) => tracing::error!(%detail, "server misconfigured"),
            other => tracing::debug!(error = %other, "request rejected"),
        }

        let body = ErrorBody {
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl<E: std::fmt::Display> From<StoreError<E>> for ApiError {
    fn from(err: StoreError<E>) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::Conflict(reason) => ApiError::Conflict(reason),
            StoreError::Invalid(reason) => ApiError::Validation(reason),
            StoreError::Provider(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl<E: std::fmt::Display> From<KeyringError<E>> for ApiError {
    fn from(err: KeyringError<E>) -> Self {
        match err {
            KeyringError::Store(e) => e.into(),
            KeyringError::EncryptionKeyUnavailable(_) => ApiError::Validation(err.to_string()),
            KeyringError::Wrap(e) => ApiError::Validation(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ChallengeNotFound
            | AuthError::InvalidSignature
            | AuthError::InvalidSession => ApiError::Unauthorized(err.to_string()),
            AuthError::MalformedSignature(_) => ApiError::Validation(err.to_string()),
            AuthError::Configuration(reason) => ApiError::Configuration(reason),
            AuthError::Store(reason) => ApiError::Internal(reason),
        }
    }
}
