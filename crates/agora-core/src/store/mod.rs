//! Account and session storage
//!
//! Sessions live in their own keyed collection (`account_id -> {token_hash}`)
//! rather than inline on the account, so rotation and revocation never need to
//! rewrite the account record. Every mutating session primitive is atomic with
//! respect to other calls on the same backend.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::{Account, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields supplied when creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub avatar_url: Option<String>,
}

/// One active refresh-token session
///
/// Only the SHA-256 digest of the refresh token is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub account_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(account_id: Uuid, token_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            token_hash,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Account persistence
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account.
    ///
    /// Fails with `DisplayNameTaken` when the case-folded display name is
    /// already used, otherwise with `EmailTaken` when the email is.
    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Case-insensitive, literal display-name lookup
    async fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>>;

    /// Set the display name and/or avatar; `None` leaves a field unchanged
    async fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Account>;
}

/// Per-account set of active refresh-token sessions
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Add a session to the account's set
    async fn add(&self, record: SessionRecord) -> Result<()>;

    async fn contains(&self, account_id: Uuid, token_hash: &str) -> Result<bool>;

    /// Remove one session; returns whether it was present
    async fn remove(&self, account_id: Uuid, token_hash: &str) -> Result<bool>;

    /// Atomically replace `old_hash` with `replacement`.
    ///
    /// Returns `false` and leaves the set untouched when `old_hash` is not a
    /// member, so a token can be rotated at most once.
    async fn rotate(
        &self,
        account_id: Uuid,
        old_hash: &str,
        replacement: SessionRecord,
    ) -> Result<bool>;

    /// Remove every session of the account; returns how many were removed
    async fn revoke_all(&self, account_id: Uuid) -> Result<u64>;

    async fn list(&self, account_id: Uuid) -> Result<Vec<SessionRecord>>;

    /// Drop sessions whose refresh token expired before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}
