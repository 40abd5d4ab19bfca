//! Application state management

use crate::auth::federated::{GoogleIdentityProvider, IdentityProvider};
use crate::auth::jwt::JwtConfig;
use crate::auth::password::PasswordConfig;
use agora_core::config::AppConfig;
use agora_core::store::{MemoryStore, PostgresStore};
use agora_core::{AccountRepository, SessionRepository, StorageBackend};
use anyhow::Context;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Account records
    pub accounts: Arc<dyn AccountRepository>,
    /// Active refresh-token sessions
    pub sessions: Arc<dyn SessionRepository>,
    /// Verifier for federated sign-in credentials
    pub identity_provider: Arc<dyn IdentityProvider>,
    /// Argon2 cost parameters for new hashes
    pub password_config: PasswordConfig,
    /// Hash checked when no account matches a login, built on first use
    pub dummy_password_hash: Arc<OnceLock<String>>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Create application state from already-built collaborators
    pub fn new(
        config: AppConfig,
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionRepository>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            accounts,
            sessions,
            identity_provider,
            password_config: PasswordConfig::default(),
            dummy_password_hash: Arc::new(OnceLock::new()),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        }
    }

    /// In-memory storage sharing one store for accounts and sessions
    pub fn in_memory(config: AppConfig, identity_provider: Arc<dyn IdentityProvider>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store, identity_provider)
    }

    /// Build state for the configured storage backend and Google sign-in
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let identity_provider: Arc<dyn IdentityProvider> =
            Arc::new(GoogleIdentityProvider::new().context("Failed to build HTTP client")?);

        match config.database.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; accounts and sessions are lost on restart");
                Ok(Self::in_memory(config, identity_provider))
            }
            StorageBackend::Postgres => {
                let url = config
                    .database
                    .postgres_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres storage backend")?;

                let store = Arc::new(PostgresStore::connect(url, config.database.pool_size).await?);
                store.migrate().await?;
                tracing::info!("Connected to PostgreSQL and applied migrations");

                Ok(Self::new(config, store.clone(), store, identity_provider))
            }
        }
    }

    /// Override Argon2 cost parameters
    pub fn with_password_config(mut self, password_config: PasswordConfig) -> Self {
        self.password_config = password_config;
        self.dummy_password_hash = Arc::new(OnceLock::new());
        self
    }

    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig::from(&self.config.auth)
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Requests completed since start
    pub fn requests_served(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Mark the service (not) ready; cleared while shutting down
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
