use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::modules::backend::BackendError;
use crate::shared::types::ApiResponse;

/// Why an authentication call failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("No profile record for the signed-in account")]
    ProfileMissing,

    #[error("{0}")]
    Provider(String),
}

#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(AuthFailure),

    #[error("Not authenticated: sign in before writing reports")]
    NotAuthenticated,

    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    #[error("Malformed record: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl AppError {
    /// Translate a provider error raised by an auth call
    pub fn from_auth_backend(err: BackendError) -> Self {
        match err {
            BackendError::InvalidCredentials => AppError::Auth(AuthFailure::InvalidCredentials),
            BackendError::EmailInUse => AppError::Auth(AuthFailure::EmailAlreadyRegistered),
            other => AppError::Auth(AuthFailure::Provider(other.to_string())),
        }
    }

    /// Translate a provider error raised by a document write
    pub fn from_write_backend(err: BackendError) -> Self {
        AppError::RemoteWrite(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            AppError::Auth(AuthFailure::EmailAlreadyRegistered) => (
                StatusCode::CONFLICT,
                AuthFailure::EmailAlreadyRegistered.to_string(),
                None,
            ),
            AppError::Auth(ref failure) => (StatusCode::UNAUTHORIZED, failure.to_string(), None),
            AppError::NotAuthenticated => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            AppError::RemoteWrite(ref msg) => {
                tracing::error!("Remote write error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone(), None)
            }
            AppError::Decode(ref msg) => {
                tracing::error!("Decode error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone(), None)
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                    None,
                )
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Validation(ref msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                Some(vec![msg.clone()]),
            ),
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::Unauthorized(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            AppError::Forbidden(ref msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
        };

        let body = Json(ApiResponse::<()>::error(Some(message), errors));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_backend_translation() {
        assert!(matches!(
            AppError::from_auth_backend(BackendError::InvalidCredentials),
            AppError::Auth(AuthFailure::InvalidCredentials)
        ));
        assert!(matches!(
            AppError::from_auth_backend(BackendError::EmailInUse),
            AppError::Auth(AuthFailure::EmailAlreadyRegistered)
        ));
        assert!(matches!(
            AppError::from_auth_backend(BackendError::Unavailable("down".into())),
            AppError::Auth(AuthFailure::Provider(_))
        ));
    }

    #[test]
    fn test_status_codes() {
        let resp = AppError::NotAuthenticated.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = AppError::Auth(AuthFailure::EmailAlreadyRegistered).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = AppError::RemoteWrite("offline".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
