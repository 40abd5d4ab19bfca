//! API error handling
//!
//! Every failure leaves the server as `{code, message, details?}` JSON.
//! Authentication failures share one generic message per endpoint so callers
//! cannot tell which check rejected them.

use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use agora_core::StoreError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Generic message for token and session failures
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    /// Missing or malformed request fields
    #[error("{0}")]
    Validation(String),

    /// Display name or email already in use
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Deployment is missing a required secret or identifier
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Database(String),
}

impl AppError {
    pub fn unauthorized() -> Self {
        AppError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Configuration(_) | AppError::Internal(_) | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::NotFound(msg) => ApiError::new("NOT_FOUND", format!("{msg} not found")),
            AppError::Validation(msg) => ApiError::new("VALIDATION_ERROR", msg),
            AppError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            AppError::Unauthorized(msg) => ApiError::new("UNAUTHORIZED", msg),
            AppError::Configuration(msg) => {
                tracing::error!(error = %msg, "Server misconfiguration");
                ApiError::new("CONFIGURATION_ERROR", msg)
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::new("INTERNAL_ERROR", "Internal server error").with_details(msg)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Storage error");
                ApiError::new("DATABASE_ERROR", "Database operation failed").with_details(msg)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(format!("Account {id}")),
            StoreError::DisplayNameTaken | StoreError::EmailTaken => {
                AppError::Conflict(err.to_string())
            }
            StoreError::DatabaseError(msg) => AppError::Database(msg),
            StoreError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::MissingSecret => AppError::Configuration(err.to_string()),
            JwtError::EncodingError(_) | JwtError::SystemTimeError(_) => {
                AppError::Internal(err.to_string())
            }
            JwtError::InvalidToken
            | JwtError::ExpiredToken
            | JwtError::InvalidSignature
            | JwtError::WrongTokenType => AppError::unauthorized(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::unauthorized().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Configuration("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_conflicts_keep_their_message() {
        match AppError::from(StoreError::DisplayNameTaken) {
            AppError::Conflict(msg) => assert_eq!(msg, "Username already exists"),
            other => panic!("unexpected {other:?}"),
        }
        match AppError::from(StoreError::EmailTaken) {
            AppError::Conflict(msg) => assert_eq!(msg, "Email already exists"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_token_failures_collapse_to_unauthorized() {
        for err in [
            JwtError::InvalidToken,
            JwtError::ExpiredToken,
            JwtError::InvalidSignature,
            JwtError::WrongTokenType,
        ] {
            match AppError::from(err) {
                AppError::Unauthorized(msg) => assert_eq!(msg, UNAUTHORIZED_MESSAGE),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        match AppError::from(JwtError::MissingSecret) {
            AppError::Configuration(msg) => assert_eq!(msg, "JWT_SECRET is not configured"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
