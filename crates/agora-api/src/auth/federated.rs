//! Federated identity verification
//!
//! An [`IdentityProvider`] turns an opaque credential issued by a third party
//! into a verified [`FederatedIdentity`]. The production implementation asks
//! Google's `tokeninfo` endpoint to validate an ID token and then checks the
//! audience and issuer itself.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Google endpoint that validates ID tokens server-side
pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Profile asserted by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Identity provider unreachable: {0}")]
    Transport(String),

    #[error("Credential rejected by identity provider: {0}")]
    Rejected(String),

    #[error("Credential was issued for a different client")]
    AudienceMismatch,

    #[error("Credential has an untrusted issuer: {0}")]
    UntrustedIssuer(String),

    #[error("Credential carries no email address")]
    MissingEmail,
}

/// Verifies third-party sign-in credentials
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify `credential` was issued for `audience` and return its profile
    async fn verify(&self, credential: &str, audience: &str)
        -> Result<FederatedIdentity, ProviderError>;
}

/// Subset of the `tokeninfo` response we rely on
#[derive(Debug, Deserialize)]
struct TokenInfo {
    iss: Option<String>,
    aud: Option<String>,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Google ID token verification over HTTPS
#[derive(Debug, Clone)]
pub struct GoogleIdentityProvider {
    client: reqwest::Client,
    tokeninfo_url: String,
}

impl GoogleIdentityProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_endpoint(GOOGLE_TOKENINFO_URL)
    }

    pub fn with_endpoint(tokeninfo_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            tokeninfo_url: tokeninfo_url.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn verify(
        &self,
        credential: &str,
        audience: &str,
    ) -> Result<FederatedIdentity, ProviderError> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;

        check_token_info(info, audience)
    }
}

fn check_token_info(info: TokenInfo, audience: &str) -> Result<FederatedIdentity, ProviderError> {
    if info.aud.as_deref() != Some(audience) {
        return Err(ProviderError::AudienceMismatch);
    }

    let issuer = info.iss.unwrap_or_default();
    if !GOOGLE_ISSUERS.contains(&issuer.as_str()) {
        return Err(ProviderError::UntrustedIssuer(issuer));
    }

    let email = info
        .email
        .filter(|email| !email.is_empty())
        .ok_or(ProviderError::MissingEmail)?;

    Ok(FederatedIdentity {
        email,
        name: info.name,
        picture: info.picture,
    })
}

/// In-process provider with a fixed credential table, for tests
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    identities: std::collections::HashMap<String, FederatedIdentity>,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `credential` and answer with `identity`
    pub fn with_identity(mut self, credential: impl Into<String>, identity: FederatedIdentity) -> Self {
        self.identities.insert(credential.into(), identity);
        self
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(
        &self,
        credential: &str,
        audience: &str,
    ) -> Result<FederatedIdentity, ProviderError> {
        if audience.is_empty() {
            return Err(ProviderError::AudienceMismatch);
        }

        self.identities
            .get(credential)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("unknown credential".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_info(aud: &str, iss: &str, email: Option<&str>) -> TokenInfo {
        TokenInfo {
            iss: Some(iss.to_string()),
            aud: Some(aud.to_string()),
            email: email.map(str::to_string),
            name: Some("Alice".to_string()),
            picture: Some("https://example.com/a.png".to_string()),
        }
    }

    #[test]
    fn test_accepts_both_google_issuer_spellings() {
        for iss in GOOGLE_ISSUERS {
            let identity =
                check_token_info(token_info("client", iss, Some("a@x.com")), "client").unwrap();
            assert_eq!(identity.email, "a@x.com");
            assert_eq!(identity.name.as_deref(), Some("Alice"));
        }
    }

    #[test]
    fn test_rejects_foreign_audience() {
        let result = check_token_info(
            token_info("someone-else", "accounts.google.com", Some("a@x.com")),
            "client",
        );
        assert!(matches!(result, Err(ProviderError::AudienceMismatch)));
    }

    #[test]
    fn test_rejects_untrusted_issuer() {
        let result = check_token_info(
            token_info("client", "https://evil.example", Some("a@x.com")),
            "client",
        );
        assert!(matches!(result, Err(ProviderError::UntrustedIssuer(_))));
    }

    #[test]
    fn test_requires_email() {
        let result = check_token_info(token_info("client", "accounts.google.com", None), "client");
        assert!(matches!(result, Err(ProviderError::MissingEmail)));
    }

    #[test]
    fn test_tokeninfo_parses_extra_fields() {
        let body = r#"{
            "iss": "https://accounts.google.com",
            "aud": "client",
            "sub": "1234567890",
            "email": "a@x.com",
            "email_verified": "true",
            "exp": "1700000000"
        }"#;
        let info: TokenInfo = serde_json::from_str(body).unwrap();
        let identity = check_token_info(info, "client").unwrap();
        assert_eq!(identity.name, None);
        assert_eq!(identity.picture, None);
    }

    #[tokio::test]
    async fn test_static_provider() {
        let identity = FederatedIdentity {
            email: "a@x.com".to_string(),
            name: None,
            picture: None,
        };
        let provider = StaticIdentityProvider::new().with_identity("good", identity.clone());

        assert_eq!(provider.verify("good", "client").await.unwrap(), identity);
        assert!(provider.verify("bad", "client").await.is_err());
        assert!(provider.verify("good", "").await.is_err());
    }
}
