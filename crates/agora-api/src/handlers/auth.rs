//! Authentication API handlers

use crate::audit::ClientInfo;
use crate::auth::{
    AuthResponse, AuthService, AuthenticatedUser, GoogleSignInRequest, LoginRequest,
    LogoutRequest, LogoutResponse, RefreshRequest, RegisterRequest, TokenResponse, UserInfo,
};
use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Register a new account
///
/// The display name is normalized (trimmed, inner whitespace collapsed) and
/// must be unique ignoring case. A session is opened immediately.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 409, description = "Username or email already exists", body = crate::error::ApiError),
        (status = 422, description = "Missing or invalid fields", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = AuthService::new(&state)
        .register(request, &ClientInfo::from_headers(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with a password
///
/// `email` is used when present, otherwise `username` is matched against
/// display names ignoring case.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid username or password", body = crate::error::ApiError),
        (status = 422, description = "Missing fields", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = AuthService::new(&state)
        .login(request, &ClientInfo::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// Sign in with a Google ID token
#[utoipa::path(
    post,
    path = "/api/v1/auth/google",
    tag = "auth",
    request_body = GoogleSignInRequest,
    responses(
        (status = 200, description = "Sign-in successful", body = AuthResponse),
        (status = 401, description = "Google sign-in failed", body = crate::error::ApiError),
        (status = 422, description = "Google credential is required", body = crate::error::ApiError),
        (status = 500, description = "GOOGLE_CLIENT_ID or JWT_SECRET not configured", body = crate::error::ApiError),
    )
)]
pub async fn google_sign_in_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<GoogleSignInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = AuthService::new(&state)
        .google_sign_in(request, &ClientInfo::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// Rotate a refresh token
///
/// The presented token is consumed. Reusing a consumed token revokes every
/// session of the account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 422, description = "Malformed request body", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = AuthService::new(&state)
        .refresh(request, &ClientInfo::from_headers(&headers))
        .await?;

    Ok(Json(response))
}

/// End the session of one refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = LogoutResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 422, description = "Refresh token is required", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    AuthService::new(&state)
        .logout(request, &ClientInfo::from_headers(&headers))
        .await?;

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// Current account profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current account", body = UserInfo),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let profile = AuthService::new(&state).get_user(user.user_id).await?;

    Ok(Json(profile))
}
