//! Security audit logging for authentication events
//!
//! Every event is emitted on the `audit` tracing target with the full event
//! serialized as JSON in the `event` field, so log pipelines can route audit
//! records separately from application logs. Events that indicate an attack
//! or misuse (refresh-token replay, rejected tokens) are logged at WARN.
//!
//! ```ignore
//! use agora_api::audit::{audit_log, AuditEvent, ClientInfo};
//!
//! audit_log(&AuditEvent::Logout {
//!     user_id: account.id,
//!     session_removed: true,
//!     client: ClientInfo::default(),
//! });
//! ```

use axum::http::{header::USER_AGENT, HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Where a request came from, as far as headers tell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// How an account proved its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInMethod {
    Password,
    Google,
}

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: Uuid,
        email: String,
        display_name: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Session issued after a password or federated sign-in
    LoginSuccess {
        user_id: Uuid,
        email: String,
        method: SignInMethod,
        #[serde(flatten)]
        client: ClientInfo,
    },

    LoginFailure {
        identifier: String,
        method: SignInMethod,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// First federated sign-in created a new account
    FederatedAccountCreated {
        user_id: Uuid,
        email: String,
        display_name: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    TokenRefresh {
        user_id: Uuid,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// A refresh token that was no longer active was presented; every
    /// session of the account has been revoked
    RefreshTokenReplay {
        user_id: Uuid,
        sessions_revoked: u64,
        #[serde(flatten)]
        client: ClientInfo,
    },

    Logout {
        user_id: Uuid,
        session_removed: bool,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Bearer or refresh token failed verification
    InvalidToken {
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::FederatedAccountCreated { .. } => "Account created from federated identity",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshTokenReplay { .. } => "Refresh token replay detected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::InvalidToken { .. } => "Invalid token",
        }
    }

    fn is_alert(&self) -> bool {
        matches!(
            self,
            AuditEvent::RefreshTokenReplay { .. } | AuditEvent::InvalidToken { .. }
        )
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            AuditEvent::RegistrationSuccess { user_id, .. }
            | AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::FederatedAccountCreated { user_id, .. }
            | AuditEvent::TokenRefresh { user_id, .. }
            | AuditEvent::RefreshTokenReplay { user_id, .. }
            | AuditEvent::Logout { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    fn client(&self) -> &ClientInfo {
        match self {
            AuditEvent::RegistrationSuccess { client, .. }
            | AuditEvent::RegistrationFailure { client, .. }
            | AuditEvent::LoginSuccess { client, .. }
            | AuditEvent::LoginFailure { client, .. }
            | AuditEvent::FederatedAccountCreated { client, .. }
            | AuditEvent::TokenRefresh { client, .. }
            | AuditEvent::RefreshTokenReplay { client, .. }
            | AuditEvent::Logout { client, .. }
            | AuditEvent::InvalidToken { client, .. } => client,
        }
    }
}

/// Emit an audit event on the `audit` target
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));
    let user_id = event.user_id();
    let ip_address = &event.client().ip_address;

    if event.is_alert() {
        warn!(
            target: "audit",
            timestamp = %timestamp,
            event = %event_json,
            user_id = ?user_id,
            ip_address = ?ip_address,
            "{}",
            event.summary()
        );
    } else {
        info!(
            target: "audit",
            timestamp = %timestamp,
            event = %event_json,
            user_id = ?user_id,
            ip_address = ?ip_address,
            "{}",
            event.summary()
        );
    }
}

/// Client IP from `X-Forwarded-For` (first hop) or `X-Real-IP`
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientInfo {
        ClientInfo {
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("Test Agent".to_string()),
        }
    }

    #[test]
    fn test_event_serialization_is_flat_and_tagged() {
        let user_id = Uuid::new_v4();
        let event = AuditEvent::RefreshTokenReplay {
            user_id,
            sessions_revoked: 3,
            client: client(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "refresh_token_replay");
        assert_eq!(json["sessions_revoked"], 3);
        assert_eq!(json["ip_address"], "192.168.1.1");
        assert_eq!(json["user_id"], user_id.to_string());
    }

    #[test]
    fn test_sign_in_method_serialization() {
        let event = AuditEvent::LoginSuccess {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            method: SignInMethod::Google,
            client: ClientInfo::default(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"method\":\"google\""));
        assert!(json.contains("login_success"));
    }

    #[test]
    fn test_alert_classification() {
        assert!(AuditEvent::InvalidToken {
            reason: "expired".to_string(),
            client: client(),
        }
        .is_alert());
        assert!(!AuditEvent::TokenRefresh {
            user_id: Uuid::new_v4(),
            client: client(),
        }
        .is_alert());
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::LoginFailure {
            identifier: "alice".to_string(),
            method: SignInMethod::Password,
            reason: "Invalid credentials".to_string(),
            client: client(),
        });
        audit_log(&AuditEvent::Logout {
            user_id: Uuid::new_v4(),
            session_removed: false,
            client: ClientInfo::default(),
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.9".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.9".to_string()));
    }

    #[test]
    fn test_client_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, "Mozilla/5.0 (Test)".parse().unwrap());

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.user_agent.as_deref(), Some("Mozilla/5.0 (Test)"));
        assert_eq!(info.ip_address, None);
    }
}
