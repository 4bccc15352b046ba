//! Authentication service.
//!
//! Email/password accounts with single-use email verification, plus the
//! exchange of an external identity provider's result for a local account.
//! Sessions themselves live in [`session`].

mod error;
pub mod session;

pub use error::AuthError;
pub use session::{CurrentUser, OptionalUser, SessionClaims, SessionKeys};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::domain::aggregates::account::normalize_email;
use crate::domain::aggregates::{Account, PendingVerification};
use crate::store::{AccountStore, Store, StoreError};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Random bytes in a verification token, before hex encoding.
const VERIFICATION_TOKEN_BYTES: usize = 32;

pub struct AuthService<'a> {
    store: &'a dyn Store,
    verification_ttl: Duration,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, verification_ttl: Duration) -> Self {
        Self { store, verification_ttl }
    }

    /// Register an email/password account.
    ///
    /// Returns the account together with the plaintext verification token,
    /// which is only ever handed to the mailer. The store keeps its hash.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` for short passwords and
    /// `AuthError::EmailTaken` if the address is already registered.
    pub async fn register_with_password(
        &self,
        username: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(Account, String), AuthError> {
        validate_password(password)?;
        let email = normalize_email(email);
        if self.store.account_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(password)?;
        let (token, pending) = issue_verification_token(now, self.verification_ttl);
        let account = Account::register(username, &email, password_hash, pending);

        self.store.insert_account(&account).await.map_err(|e| match e {
            StoreError::Duplicate("email") => AuthError::EmailTaken,
            other => AuthError::Store(other),
        })?;

        tracing::info!(account_id = %account.id, "Account registered");
        Ok((account, token))
    }

    /// Consume a verification token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for unknown or already-used tokens and
    /// `AuthError::TokenExpired` once the token's lifetime has passed.
    pub async fn verify_email(&self, token: &str, now: DateTime<Utc>) -> Result<Account, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let mut account = self
            .store
            .account_by_verification_hash(&hash_token(token))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        account.consume_verification(now)?;
        self.store.update_account(&account).await?;

        tracing::info!(account_id = %account.id, "Email verified");
        Ok(account)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong
    /// and `AuthError::EmailNotVerified` for correct credentials on an
    /// unverified account.
    pub async fn login_with_password(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let account = self
            .store
            .account_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = account.password_hash.as_deref().ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, hash)?;

        if !account.is_verified {
            return Err(AuthError::EmailNotVerified);
        }
        Ok(account)
    }

    /// Find or create the account for an identity-provider login.
    ///
    /// Provider accounts are created already verified. An existing account
    /// with the same email is reused whatever its provider.
    pub async fn login_with_provider(&self, provider: &str, username: &str, email: &str) -> Result<Account, AuthError> {
        let email = normalize_email(email);
        if let Some(existing) = self.store.account_by_email(&email).await? {
            return Ok(existing);
        }

        let account = Account::from_provider(provider, username, &email);
        match self.store.insert_account(&account).await {
            Ok(()) => {
                tracing::info!(account_id = %account.id, provider = %account.provider, "Provider account created");
                Ok(account)
            }
            // Lost a race with a concurrent first login.
            Err(StoreError::Duplicate("email")) => self
                .store
                .account_by_email(&email)
                .await?
                .ok_or(AuthError::InvalidCredentials),
            Err(other) => Err(AuthError::Store(other)),
        }
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// New verification token: the hex plaintext for the email link and the
/// pending record (SHA-256 of the token plus expiry) to persist.
pub fn issue_verification_token(now: DateTime<Utc>, ttl: Duration) -> (String, PendingVerification) {
    let mut bytes = [0u8; VERIFICATION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let pending = PendingVerification { token_hash: hash_token(&token), expires_at: now + ttl };
    (token, pending)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
