//! JWT token generation and validation
//!
//! Implements HMAC-SHA256 signed bearer tokens. Access and refresh tokens share
//! the signing secret but carry different lifetimes and a `typ` claim, so one
//! can never be presented in place of the other.

use agora_core::AuthConfig;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Message surfaced when no signing secret is configured
pub const MISSING_SECRET_MESSAGE: &str = "JWT_SECRET is not configured";

/// Which kind of bearer token a set of claims describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - account ID
    pub sub: String,
    /// JWT ID - makes every issued token unique, even within the same second
    pub jti: String,
    /// Access or refresh
    pub typ: TokenType,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
}

impl Claims {
    /// Account id named by the `sub` claim
    pub fn subject(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT_SECRET is not configured")]
    MissingSecret,

    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Unexpected token type")]
    WrongTokenType,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing; `None` means every operation fails
    pub secret: Option<String>,
    /// Access token expiration time in seconds (default: 3600 = 1 hour)
    pub access_expiration_secs: u64,
    /// Refresh token expiration time in seconds (default: 86400 = 1 day)
    pub refresh_expiration_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            secret: auth.jwt_secret.clone(),
            access_expiration_secs: auth.access_token_ttl_secs,
            refresh_expiration_secs: auth.refresh_token_ttl_secs,
            issuer: auth.issuer.clone(),
        }
    }
}

impl JwtConfig {
    fn secret(&self) -> Result<&[u8], JwtError> {
        self.secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::as_bytes)
            .ok_or(JwtError::MissingSecret)
    }

    fn lifetime(&self, typ: TokenType) -> u64 {
        match typ {
            TokenType::Access => self.access_expiration_secs,
            TokenType::Refresh => self.refresh_expiration_secs,
        }
    }
}

/// Freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Sign a token of the given type for `subject`
pub fn generate_token(
    config: &JwtConfig,
    subject: Uuid,
    typ: TokenType,
) -> Result<(String, Claims), JwtError> {
    let secret = config.secret()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: subject.to_string(),
        jti: Uuid::new_v4().to_string(),
        typ,
        iat: now,
        exp: now + config.lifetime(typ),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?;

    Ok((token, claims))
}

/// Validate signature, expiry, issuer and token type
///
/// Callers facing the network must not reveal which check failed.
pub fn validate_token(config: &JwtConfig, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let secret = config.secret()?;

    let mut validation = Validation::new(Algorithm::HS256);
    // Expired sessions are purged at `expires_at <= now`; tokens must not outlive them
    validation.leeway = 0;
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "sub", "iss"]);

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
            _ => JwtError::InvalidToken,
        })?;

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    if token_data.claims.exp <= now {
        return Err(JwtError::ExpiredToken);
    }

    if token_data.claims.typ != expected {
        return Err(JwtError::WrongTokenType);
    }

    Ok(token_data.claims)
}

/// Stateless signer for access/refresh pairs
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    config: JwtConfig,
}

impl TokenIssuer {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    /// Fail fast when the deployment has no signing secret
    pub fn ensure_configured(&self) -> Result<(), JwtError> {
        self.config.secret().map(|_| ())
    }

    /// Sign an access token and a refresh token for `subject`
    pub fn issue_pair(&self, subject: Uuid) -> Result<TokenPair, JwtError> {
        let (access_token, _) = generate_token(&self.config, subject, TokenType::Access)?;
        let (refresh_token, refresh_claims) =
            generate_token(&self.config, subject, TokenType::Refresh)?;

        let refresh_expires_at = Utc
            .timestamp_opt(refresh_claims.exp as i64, 0)
            .single()
            .ok_or(JwtError::InvalidToken)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_expires_at,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        validate_token(&self.config, token, TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        validate_token(&self.config, token, TokenType::Refresh)
    }
}
