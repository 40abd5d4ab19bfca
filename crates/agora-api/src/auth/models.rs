//! Request and response bodies for the auth endpoints
//!
//! All bodies use camelCase field names on the wire. Request fields are
//! optional at the type level so a missing field reaches validation and is
//! answered with a JSON error rather than a deserializer rejection.

use agora_core::Account;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Register request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Desired display name
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[schema(example = "a@x.com")]
    pub email: Option<String>,
    #[schema(example = "secret123")]
    pub password: Option<String>,
    /// Optional avatar URL
    pub photo_url: Option<String>,
}

/// Login request
///
/// `email` takes precedence when both identifiers are supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Federated sign-in request carrying a Google ID token
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSignInRequest {
    pub credential: Option<String>,
}

/// Refresh token request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Logout request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// Public projection of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub email: String,
    /// Account avatar, or the placeholder image when none is set
    pub avatar_url: String,
}

impl UserInfo {
    pub fn from_account(account: &Account, default_avatar_url: &str) -> Self {
        Self {
            id: account.id,
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            avatar_url: account.avatar_or(default_avatar_url).to_string(),
        }
    }
}

/// Returned by register, login and federated sign-in
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserInfo,
}

/// Returned by refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    #[schema(example = "Logged out successfully")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_requests_use_camel_case() {
        let request: RefreshRequest =
            serde_json::from_str(r#"{"refreshToken": "abc"}"#).unwrap();
        assert_eq!(request.refresh_token.as_deref(), Some("abc"));

        let request: RegisterRequest = serde_json::from_str(
            r#"{"username": "alice", "email": "a@x.com", "password": "p", "photoUrl": "u"}"#,
        )
        .unwrap();
        assert_eq!(request.photo_url.as_deref(), Some("u"));
    }

    #[test]
    fn test_missing_fields_deserialize_as_none() {
        let request: LoginRequest = serde_json::from_str("{}").unwrap();
        assert!(request.username.is_none());
        assert!(request.email.is_none());
        assert!(request.password.is_none());
    }

    #[test]
    fn test_user_info_substitutes_placeholder_avatar() {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            display_name: Some("alice".to_string()),
            password_hash: "$argon2id$hash".to_string(),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };

        let info = UserInfo::from_account(&account, "http://placeholder/default.svg");
        assert_eq!(info.avatar_url, "http://placeholder/default.svg");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["displayName"], "alice");
        assert_eq!(json["avatarUrl"], "http://placeholder/default.svg");
        assert!(json.get("passwordHash").is_none());
    }
}
