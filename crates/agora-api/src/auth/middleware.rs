//! Bearer-token authentication for protected routes
//!
//! Validates the access token in the `Authorization` header and adds the
//! caller to request extensions as [`AuthenticatedUser`].

use super::jwt::{validate_token, JwtConfig, JwtError, TokenType};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::{ApiError, UNAUTHORIZED_MESSAGE};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Caller identity taken from a verified access token
///
/// Extract in handlers with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    /// JWT ID of the presented token
    pub jti: String,
    /// Access token expiry (Unix epoch)
    pub expires_at: u64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(JwtError),

    #[error("{0}")]
    Misconfigured(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::MissingSecret => AuthError::Misconfigured(err.to_string()),
            other => AuthError::InvalidToken(other),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AuthError::Misconfigured(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("CONFIGURATION_ERROR", msg),
            ),
            // Which check failed is never revealed
            _ => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("UNAUTHORIZED", UNAUTHORIZED_MESSAGE),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Verify an `Authorization` header value and return the caller
pub fn verify_bearer(config: &JwtConfig, header_value: &str) -> Result<AuthenticatedUser, AuthError> {
    let token = header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)?;

    let claims = validate_token(config, token, TokenType::Access)?;

    Ok(AuthenticatedUser {
        user_id: claims.subject()?,
        jti: claims.jti,
        expires_at: claims.exp,
    })
}

/// Reject requests without a valid access token
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let user = match verify_bearer(&state.jwt_config(), header_value) {
        Ok(user) => user,
        Err(e) => {
            if let AuthError::InvalidToken(reason) = &e {
                audit_log(&AuditEvent::InvalidToken {
                    reason: reason.to_string(),
                    client: ClientInfo::from_headers(request.headers()),
                });
            }
            return Err(e);
        }
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenIssuer;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: Some("middleware-secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_verify_bearer_accepts_access_token() {
        let subject = Uuid::new_v4();
        let pair = TokenIssuer::new(config()).issue_pair(subject).unwrap();

        let user = verify_bearer(&config(), &format!("Bearer {}", pair.access_token)).unwrap();
        assert_eq!(user.user_id, subject);
        assert!(!user.jti.is_empty());
    }

    #[test]
    fn test_verify_bearer_rejects_refresh_token() {
        let pair = TokenIssuer::new(config()).issue_pair(Uuid::new_v4()).unwrap();

        let result = verify_bearer(&config(), &format!("Bearer {}", pair.refresh_token));
        assert!(matches!(result, Err(AuthError::InvalidToken(JwtError::WrongTokenType))));
    }

    #[test]
    fn test_verify_bearer_requires_scheme() {
        assert!(matches!(
            verify_bearer(&config(), "Token abc"),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            verify_bearer(&config(), "Bearer "),
            Err(AuthError::InvalidAuthHeader)
        ));
    }

    #[test]
    fn test_missing_secret_is_not_an_auth_failure() {
        let result = verify_bearer(&JwtConfig::default(), "Bearer abc");
        assert!(matches!(result, Err(AuthError::Misconfigured(_))));

        let response = AuthError::Misconfigured("JWT_SECRET is not configured".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_auth_errors_are_uniform() {
        for err in [
            AuthError::MissingAuthHeader,
            AuthError::InvalidAuthHeader,
            AuthError::InvalidToken(JwtError::ExpiredToken),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
