//! Agora Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token and identity-provider configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            config.server.port = parse_var("API_PORT", port)?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Storage
        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            config.database.backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.postgres_url = Some(url);
        }
        if let Ok(size) = std::env::var("DATABASE_POOL_SIZE") {
            config.database.pool_size = parse_var("DATABASE_POOL_SIZE", size)?;
        }

        // Tokens
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.auth.jwt_secret = Some(secret).filter(|s| !s.is_empty());
        }
        if let Ok(secs) = std::env::var("JWT_EXPIRES_IN") {
            config.auth.access_token_ttl_secs = parse_var("JWT_EXPIRES_IN", secs)?;
        }
        if let Ok(secs) = std::env::var("JWT_REFRESH_EXPIRES_IN") {
            config.auth.refresh_token_ttl_secs = parse_var("JWT_REFRESH_EXPIRES_IN", secs)?;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config.auth.issuer = issuer;
        }
        if let Ok(client_id) = std::env::var("GOOGLE_CLIENT_ID") {
            config.auth.google_client_id = Some(client_id).filter(|s| !s.is_empty());
        }
        if let Ok(url) = std::env::var("DEFAULT_AVATAR_URL") {
            config.auth.default_avatar_url = url;
        }
        if let Ok(secs) = std::env::var("SESSION_PURGE_INTERVAL_SECS") {
            config.auth.session_purge_interval_secs =
                parse_var("SESSION_PURGE_INTERVAL_SECS", secs)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        // Only override if env values differ from defaults
        if env_config.server.host != ServerConfig::default().host {
            self.server.host = env_config.server.host;
        }
        if env_config.server.port != ServerConfig::default().port {
            self.server.port = env_config.server.port;
        }
        if env_config.database.postgres_url.is_some() {
            self.database.backend = env_config.database.backend;
            self.database.postgres_url = env_config.database.postgres_url;
        }

        // Always use env for secrets
        if env_config.auth.jwt_secret.is_some() {
            self.auth.jwt_secret = env_config.auth.jwt_secret;
        }
        if env_config.auth.google_client_id.is_some() {
            self.auth.google_client_id = env_config.auth.google_client_id;
        }

        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS (empty = permissive in development)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec![],
        }
    }
}

/// Where accounts and sessions are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(ConfigError::InvalidValue {
                key: "STORAGE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Storage backend
    pub backend: StorageBackend,

    /// PostgreSQL connection URL (required for the postgres backend)
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            postgres_url: None,
            pool_size: 10,
        }
    }
}

/// Token issuance and identity-provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret. Every token operation fails with a
    /// configuration error while this is unset.
    pub jwt_secret: Option<String>,

    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: u64,

    /// Token issuer claim
    pub issuer: String,

    /// OAuth client id registered with Google; only federated sign-in needs it
    pub google_client_id: Option<String>,

    /// Placeholder avatar used when an account has none
    pub default_avatar_url: String,

    /// How often expired session records are purged
    pub session_purge_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86400,
            issuer: "agora".to_string(),
            google_client_id: None,
            default_avatar_url: "http://localhost:8080/public/images/default-user.svg"
                .to_string(),
            session_purge_interval_secs: 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.access_token_ttl_secs, 3600);
        assert_eq!(config.auth.refresh_token_ttl_secs, 86400);
        assert!(config.auth.jwt_secret.is_none());
        assert!(config.auth.google_client_id.is_none());
        assert_eq!(config.database.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert_eq!(
            "Postgres".parse::<StorageBackend>().unwrap(),
            StorageBackend::Postgres
        );
        assert!("mongo".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        let err = parse_var::<u64>("JWT_EXPIRES_IN", "soon".to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "JWT_EXPIRES_IN"));
    }

    #[test]
    fn test_from_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            jwt_secret = "from-file"
            access_token_ttl_secs = 60
            refresh_token_ttl_secs = 600
            issuer = "agora-test"
            default_avatar_url = "https://cdn.example/default.svg"
            session_purge_interval_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-file"));
        assert_eq!(config.auth.access_token_ttl_secs, 60);
        assert_eq!(config.server.port, 8080);
    }
}
