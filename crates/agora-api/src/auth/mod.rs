//! Authentication and session management
//!
//! - Token issuance and verification (HS256 JWT, access and refresh)
//! - Password hashing with Argon2id
//! - Federated sign-in through an identity provider
//! - Bearer-token middleware for protected routes
//! - The service that ties credentials, accounts and sessions together

pub mod federated;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub use federated::StaticIdentityProvider;
pub use federated::{FederatedIdentity, GoogleIdentityProvider, IdentityProvider, ProviderError};
pub use jwt::{Claims, JwtConfig, JwtError, TokenIssuer, TokenPair, TokenType};
pub use middleware::{auth_middleware, verify_bearer, AuthError, AuthenticatedUser};
pub use models::{
    AuthResponse, GoogleSignInRequest, LoginRequest, LogoutRequest, LogoutResponse,
    RefreshRequest, RegisterRequest, TokenResponse, UserInfo,
};
pub use password::{hash_password, verify_password, PasswordConfig};
pub use service::{hash_token, AuthService, Credential, LoginIdentifier};
