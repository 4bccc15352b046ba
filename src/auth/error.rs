//! Authentication error types.

use thiserror::Error;

use crate::domain::aggregates::AccountError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email/password, or a password login against a provider account.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email address has not been verified")]
    EmailNotVerified,

    #[error("an account with this email already exists")]
    EmailTaken,

    #[error("{0}")]
    WeakPassword(String),

    /// Unknown or already-consumed verification token.
    #[error("invalid verification token")]
    InvalidToken,

    #[error("verification token has expired")]
    TokenExpired,

    /// Missing, malformed or expired session token.
    #[error("invalid or expired session")]
    InvalidSession,

    /// Provider exchange attempted with a wrong or unconfigured shared secret.
    #[error("identity provider not accepted")]
    ProviderRejected,

    #[error("password hashing error")]
    PasswordHash,

    #[error("session signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AccountError> for AuthError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::NoPendingVerification => Self::InvalidToken,
            AccountError::VerificationExpired => Self::TokenExpired,
        }
    }
}
