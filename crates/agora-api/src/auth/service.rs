//! Authentication service
//!
//! Every successful credential check, whatever its kind, ends in
//! [`AuthService::issue_session`], which mints an access/refresh pair and
//! records the refresh token's digest as an active session. Refresh tokens are
//! single-use: [`AuthService::refresh`] swaps the presented token for a new one
//! in one atomic step, and a token that is no longer active revokes every
//! session of its account.

use super::federated::{FederatedIdentity, IdentityProvider};
use super::jwt::{JwtError, TokenIssuer, TokenPair};
use super::models::{
    AuthResponse, GoogleSignInRequest, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, TokenResponse, UserInfo,
};
use super::password::{hash_password, hash_unusable_password, verify_password, PasswordConfig};
use crate::audit::{audit_log, AuditEvent, ClientInfo, SignInMethod};
use crate::error::AppError;
use crate::metrics;
use crate::state::AppState;
use agora_core::{
    normalize_display_name, resolve_unique_display_name, Account, AccountRepository, NewAccount,
    SessionRecord, SessionRepository, StoreError,
};
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or password";
pub const FEDERATED_FAILURE_MESSAGE: &str = "Google sign-in failed";
pub const MISSING_CLIENT_ID_MESSAGE: &str = "GOOGLE_CLIENT_ID is not configured";

/// Attempts at creating a federated account before giving up on a
/// display name that keeps getting claimed concurrently
const MAX_NAME_ATTEMPTS: usize = 5;

/// Identifier supplied with a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Email(String),
    /// Already normalized display name
    DisplayName(String),
}

/// Proof of identity accepted by [`AuthService::authenticate`]
#[derive(Debug, Clone)]
pub enum Credential {
    Password {
        identifier: LoginIdentifier,
        password: String,
    },
    /// Opaque ID token from the federated provider
    Federated { credential: String },
}

impl Credential {
    fn method(&self) -> SignInMethod {
        match self {
            Credential::Password { .. } => SignInMethod::Password,
            Credential::Federated { .. } => SignInMethod::Google,
        }
    }
}

/// SHA-256 hex digest under which a refresh token is stored
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionRepository>,
    identity_provider: Arc<dyn IdentityProvider>,
    issuer: TokenIssuer,
    password_config: PasswordConfig,
    dummy_password_hash: Arc<OnceLock<String>>,
    google_client_id: Option<String>,
    default_avatar_url: String,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            accounts: state.accounts.clone(),
            sessions: state.sessions.clone(),
            identity_provider: state.identity_provider.clone(),
            issuer: TokenIssuer::new(state.jwt_config()),
            password_config: state.password_config.clone(),
            dummy_password_hash: state.dummy_password_hash.clone(),
            google_client_id: state.config.auth.google_client_id.clone(),
            default_avatar_url: state.config.auth.default_avatar_url.clone(),
        }
    }

    /// Create an account with a password and open its first session
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<AuthResponse, AppError> {
        let (Some(username), Some(email), Some(password)) = (
            non_empty(request.username),
            non_empty(request.email),
            request.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::Validation(
                "username, email and password are required".to_string(),
            ));
        };

        if !email.contains('@') {
            return Err(AppError::Validation("Invalid email format".to_string()));
        }

        self.issuer.ensure_configured()?;

        let display_name = normalize_display_name(&username);

        let conflict = if self.accounts.find_by_display_name(&display_name).await?.is_some() {
            Some(StoreError::DisplayNameTaken)
        } else if self.accounts.find_by_email(&email).await?.is_some() {
            Some(StoreError::EmailTaken)
        } else {
            None
        };

        if let Some(conflict) = conflict {
            audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: conflict.to_string(),
                client: client.clone(),
            });
            return Err(conflict.into());
        }

        let password_hash = hash_password(&password, &self.password_config)?;
        let avatar_url = non_empty(request.photo_url).unwrap_or_else(|| self.default_avatar_url.clone());

        // The store re-checks both constraints, closing the race with a
        // concurrent registration of the same name or email
        let account = self
            .accounts
            .create_account(NewAccount {
                email,
                display_name: Some(display_name.clone()),
                password_hash,
                avatar_url: Some(avatar_url),
            })
            .await?;

        let tokens = self.issue_session(&account).await?;

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: account.id,
            email: account.email.clone(),
            display_name,
            client: client.clone(),
        });

        Ok(self.auth_response(tokens, &account))
    }

    /// Password login by email, or by display name when no email is given
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<AuthResponse, AppError> {
        let identifier = match (non_empty(request.email), non_empty(request.username)) {
            (Some(email), _) => LoginIdentifier::Email(email),
            (None, Some(username)) => LoginIdentifier::DisplayName(normalize_display_name(&username)),
            (None, None) => {
                return Err(AppError::Validation(
                    "email or username is required".to_string(),
                ))
            }
        };
        let Some(password) = request.password.filter(|p| !p.is_empty()) else {
            return Err(AppError::Validation("password is required".to_string()));
        };

        self.issuer.ensure_configured()?;

        let account = self
            .authenticate(Credential::Password { identifier, password }, client)
            .await?;
        let tokens = self.issue_session(&account).await?;

        Ok(self.auth_response(tokens, &account))
    }

    /// Sign in with a Google ID token, creating the account on first use
    pub async fn google_sign_in(
        &self,
        request: GoogleSignInRequest,
        client: &ClientInfo,
    ) -> Result<AuthResponse, AppError> {
        let Some(credential) = non_empty(request.credential) else {
            return Err(AppError::Validation("Google credential is required".to_string()));
        };

        self.issuer.ensure_configured()?;

        let account = self
            .authenticate(Credential::Federated { credential }, client)
            .await?;
        let tokens = self.issue_session(&account).await?;

        Ok(self.auth_response(tokens, &account))
    }

    /// Resolve a credential to an account
    ///
    /// Failures are reported with one generic message per credential kind.
    pub async fn authenticate(
        &self,
        credential: Credential,
        client: &ClientInfo,
    ) -> Result<Account, AppError> {
        let method = credential.method();

        match credential {
            Credential::Password { identifier, password } => {
                let (label, found) = match &identifier {
                    LoginIdentifier::Email(email) => {
                        (email.clone(), self.accounts.find_by_email(email).await?)
                    }
                    LoginIdentifier::DisplayName(name) => {
                        (name.clone(), self.accounts.find_by_display_name(name).await?)
                    }
                };

                let verified = match &found {
                    Some(account) => verify_password(&password, &account.password_hash)?,
                    None => {
                        self.verify_dummy_password(&password);
                        false
                    }
                };

                let account = match found {
                    Some(account) if verified => account,
                    _ => {
                        self.record_sign_in_failure(label, method, "Invalid credentials", client);
                        return Err(AppError::Unauthorized(INVALID_CREDENTIALS_MESSAGE.to_string()));
                    }
                };

                self.record_sign_in(&account, method, client);
                Ok(account)
            }
            Credential::Federated { credential } => {
                let Some(audience) = self.google_client_id.as_deref().filter(|id| !id.is_empty())
                else {
                    return Err(AppError::Configuration(MISSING_CLIENT_ID_MESSAGE.to_string()));
                };

                let identity = match self.identity_provider.verify(&credential, audience).await {
                    Ok(identity) => identity,
                    Err(e) => {
                        tracing::warn!(error = %e, "Federated credential rejected");
                        self.record_sign_in_failure("google".to_string(), method, &e.to_string(), client);
                        return Err(AppError::Unauthorized(FEDERATED_FAILURE_MESSAGE.to_string()));
                    }
                };

                let account = self.resolve_federated_account(identity, client).await?;
                self.record_sign_in(&account, method, client);
                Ok(account)
            }
        }
    }

    /// Run one Argon2 verification with the configured cost so an unknown
    /// identifier takes as long to reject as a wrong password
    fn verify_dummy_password(&self, password: &str) {
        let dummy = self.dummy_password_hash.get_or_init(|| {
            hash_unusable_password(&self.password_config).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build dummy password hash");
                String::new()
            })
        });

        if !dummy.is_empty() {
            let _ = verify_password(password, dummy);
        }
    }

    /// Mint a token pair and record the refresh token as an active session
    pub async fn issue_session(&self, account: &Account) -> Result<TokenPair, AppError> {
        let tokens = self.issuer.issue_pair(account.id)?;

        self.sessions
            .add(SessionRecord::new(
                account.id,
                hash_token(&tokens.refresh_token),
                tokens.refresh_expires_at,
            ))
            .await?;

        metrics::SESSIONS_ISSUED_TOTAL.inc();
        Ok(tokens)
    }

    /// Exchange an active refresh token for a new pair
    ///
    /// The presented token is consumed. Presenting a token that verifies but
    /// is no longer active revokes all sessions of the account.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        client: &ClientInfo,
    ) -> Result<TokenResponse, AppError> {
        let Some(refresh_token) = non_empty(request.refresh_token) else {
            metrics::AUTH_FAILURES_TOTAL.with_label_values(&["refresh"]).inc();
            return Err(AppError::unauthorized());
        };

        let account = self.verified_account(&refresh_token, "refresh", client).await?;

        let tokens = self.issuer.issue_pair(account.id)?;
        let replacement = SessionRecord::new(
            account.id,
            hash_token(&tokens.refresh_token),
            tokens.refresh_expires_at,
        );

        let rotated = self
            .sessions
            .rotate(account.id, &hash_token(&refresh_token), replacement)
            .await?;

        if !rotated {
            self.revoke_on_replay(&account, client).await?;
            metrics::AUTH_FAILURES_TOTAL.with_label_values(&["refresh"]).inc();
            return Err(AppError::unauthorized());
        }

        metrics::SESSION_ROTATIONS_TOTAL.inc();
        audit_log(&AuditEvent::TokenRefresh {
            user_id: account.id,
            client: client.clone(),
        });

        Ok(TokenResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// End the session belonging to one refresh token
    ///
    /// Other sessions of the same account are untouched. Logging out an
    /// already-ended session still succeeds.
    pub async fn logout(&self, request: LogoutRequest, client: &ClientInfo) -> Result<(), AppError> {
        let Some(refresh_token) = non_empty(request.refresh_token) else {
            return Err(AppError::Validation("Refresh token is required".to_string()));
        };

        let account = self.verified_account(&refresh_token, "logout", client).await?;

        let session_removed = self
            .sessions
            .remove(account.id, &hash_token(&refresh_token))
            .await?;

        metrics::LOGOUTS_TOTAL.inc();
        audit_log(&AuditEvent::Logout {
            user_id: account.id,
            session_removed,
            client: client.clone(),
        });

        Ok(())
    }

    /// Public profile of an account
    pub async fn get_user(&self, account_id: Uuid) -> Result<UserInfo, AppError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(StoreError::NotFound(account_id))?;

        Ok(UserInfo::from_account(&account, &self.default_avatar_url))
    }

    /// Verify a refresh token and load the account it names
    async fn verified_account(
        &self,
        refresh_token: &str,
        operation: &str,
        client: &ClientInfo,
    ) -> Result<Account, AppError> {
        let reject = |reason: String| {
            metrics::AUTH_FAILURES_TOTAL.with_label_values(&[operation]).inc();
            audit_log(&AuditEvent::InvalidToken {
                reason,
                client: client.clone(),
            });
            AppError::unauthorized()
        };

        let claims = match self.issuer.verify_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(JwtError::MissingSecret) => return Err(JwtError::MissingSecret.into()),
            Err(e) => return Err(reject(e.to_string())),
        };
        let account_id = claims.subject().map_err(|e| reject(e.to_string()))?;

        match self.accounts.find_by_id(account_id).await? {
            Some(account) => Ok(account),
            None => Err(reject("Token subject does not exist".to_string())),
        }
    }

    /// Wipe every session of an account after an inactive token was replayed
    async fn revoke_on_replay(&self, account: &Account, client: &ClientInfo) -> Result<(), AppError> {
        let sessions_revoked = self.sessions.revoke_all(account.id).await?;

        metrics::REPLAY_SWEEPS_TOTAL.inc();
        metrics::SESSIONS_REVOKED_TOTAL.inc_by(sessions_revoked);
        audit_log(&AuditEvent::RefreshTokenReplay {
            user_id: account.id,
            sessions_revoked,
            client: client.clone(),
        });

        Ok(())
    }

    /// Find or create the account for a verified federated identity
    async fn resolve_federated_account(
        &self,
        identity: FederatedIdentity,
        client: &ClientInfo,
    ) -> Result<Account, AppError> {
        let avatar_url = non_empty(identity.picture.clone())
            .unwrap_or_else(|| self.default_avatar_url.clone());
        let preferred_name = non_empty(identity.name.clone()).unwrap_or_else(|| {
            identity
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        });

        for _ in 0..MAX_NAME_ATTEMPTS {
            if let Some(existing) = self.accounts.find_by_email(&identity.email).await? {
                let backfill = match existing.display_name {
                    Some(_) => None,
                    None => Some(resolve_unique_display_name(self.accounts.as_ref(), &preferred_name).await?),
                };

                match self
                    .accounts
                    .update_profile(existing.id, backfill.as_deref(), Some(&avatar_url))
                    .await
                {
                    Ok(account) => return Ok(account),
                    Err(StoreError::DisplayNameTaken) => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            let display_name =
                resolve_unique_display_name(self.accounts.as_ref(), &preferred_name).await?;

            let created = self
                .accounts
                .create_account(NewAccount {
                    email: identity.email.clone(),
                    display_name: Some(display_name.clone()),
                    password_hash: hash_unusable_password(&self.password_config)?,
                    avatar_url: Some(avatar_url.clone()),
                })
                .await;

            match created {
                Ok(account) => {
                    audit_log(&AuditEvent::FederatedAccountCreated {
                        user_id: account.id,
                        email: account.email.clone(),
                        display_name,
                        client: client.clone(),
                    });
                    return Ok(account);
                }
                // Lost a race for the name, or for the email itself; look again
                Err(StoreError::DisplayNameTaken) | Err(StoreError::EmailTaken) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(
            "Could not assign a unique display name".to_string(),
        ))
    }

    fn auth_response(&self, tokens: TokenPair, account: &Account) -> AuthResponse {
        AuthResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: UserInfo::from_account(account, &self.default_avatar_url),
        }
    }

    fn record_sign_in(&self, account: &Account, method: SignInMethod, client: &ClientInfo) {
        audit_log(&AuditEvent::LoginSuccess {
            user_id: account.id,
            email: account.email.clone(),
            method,
            client: client.clone(),
        });
    }

    fn record_sign_in_failure(
        &self,
        identifier: String,
        method: SignInMethod,
        reason: &str,
        client: &ClientInfo,
    ) {
        let operation = match method {
            SignInMethod::Password => "login",
            SignInMethod::Google => "google",
        };
        metrics::AUTH_FAILURES_TOTAL.with_label_values(&[operation]).inc();
        audit_log(&AuditEvent::LoginFailure {
            identifier,
            method,
            reason: reason.to_string(),
            client: client.clone(),
        });
    }
}
