mod password;
mod service;
mod token;


pub use password::{BcryptHasher, PasswordHasher};
pub use service::{AuthContext, AuthService};
pub use token::{Claims, IssuedToken, TokenAuthenticator, TokenError};

use crate::store::StoreError;
use thiserror::Error;

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token on a request that requires one
    #[error("Token missing")]
    MissingToken,

    /// Signature, format or claim-expiry failure
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Token is well-formed and signed but its session row is gone or expired
    #[error("Token revoked or not found")]
    Revoked,

    /// Password hashing backend failed
    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
