//! Agora Core - Identity models, storage traits, and shared types
//!
//! This crate defines the core abstractions used by the Agora identity layer:
//! - Account model and public projection
//! - Storage error types
//! - Account and session repository traits (in-memory and PostgreSQL)
//! - Unique display-name resolution
//! - Configuration management

pub mod config;
pub mod naming;
pub mod store;

pub use config::{AppConfig, AuthConfig, ConfigError, DatabaseConfig, StorageBackend};
pub use naming::{normalize_display_name, resolve_unique_display_name, DEFAULT_DISPLAY_NAME};
pub use store::{AccountRepository, NewAccount, SessionRecord, SessionRepository};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by account and session storage
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    NotFound(Uuid),

    #[error("Email already exists")]
    EmailTaken,

    #[error("Username already exists")]
    DisplayNameTaken,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Accounts
// ============================================================================

/// Durable identity record
///
/// Accounts are created at registration or on first federated sign-in and are
/// never deleted by the identity layer. Refresh-token sessions are not stored
/// inline; see [`SessionRepository`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Immutable account identifier
    pub id: Uuid,

    /// Unique email address (compared exactly)
    pub email: String,

    /// Display name, unique under case-insensitive comparison.
    /// Older accounts may not have one.
    pub display_name: Option<String>,

    /// Argon2id PHC string. Never serialized in API responses.
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Profile picture; the placeholder is substituted when absent
    pub avatar_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Avatar URL, falling back to the given placeholder
    pub fn avatar_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.avatar_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(placeholder)
    }
}

/// Case-folded form used for display-name uniqueness
pub fn fold_display_name(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(avatar: Option<&str>) -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            email: "alice@x.com".to_string(),
            display_name: Some("alice".to_string()),
            password_hash: "$argon2id$secret".to_string(),
            avatar_url: avatar.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_avatar_falls_back_to_placeholder() {
        let placeholder = "http://localhost:8080/public/images/default-user.svg";

        assert_eq!(account(None).avatar_or(placeholder), placeholder);
        assert_eq!(account(Some("")).avatar_or(placeholder), placeholder);
        assert_eq!(
            account(Some("https://cdn.example/a.png")).avatar_or(placeholder),
            "https://cdn.example/a.png"
        );
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_string(&account(None)).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
    }

    #[test]
    fn test_fold_display_name() {
        assert_eq!(fold_display_name("Alice"), fold_display_name("aLICE"));
        assert_ne!(fold_display_name("Alice"), fold_display_name("Alice 1"));
    }
}
