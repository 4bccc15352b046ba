//! Account Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{AccountEvent, DomainEvent};
use crate::domain::role::Role;

/// Provider name recorded for email/password accounts.
pub const CREDENTIALS_PROVIDER: &str = "credentials";

/// Hash and expiry of an outstanding email-verification token. The plaintext
/// token is never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingVerification {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub provider: String,
    pub is_verified: bool,
    #[serde(skip)]
    pub verification: Option<PendingVerification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Account {
    /// Email/password signup. The account stays unverified until the token is consumed.
    pub fn register(username: &str, email: &str, password_hash: String, verification: PendingVerification) -> Self {
        let now = Utc::now();
        let mut account = Self {
            id: Uuid::now_v7(), username: username.trim().to_string(), email: normalize_email(email),
            password_hash: Some(password_hash), role: Role::User, provider: CREDENTIALS_PROVIDER.to_string(),
            is_verified: false, verification: Some(verification), created_at: now, updated_at: now, events: vec![],
        };
        account.raise_event(DomainEvent::Account(AccountEvent::Registered {
            account_id: account.id, email: account.email.clone(), provider: account.provider.clone(),
        }));
        account
    }

    /// Account created from a social/identity-provider login. Trusted as verified.
    pub fn from_provider(provider: &str, username: &str, email: &str) -> Self {
        let now = Utc::now();
        let mut account = Self {
            id: Uuid::now_v7(), username: username.trim().to_string(), email: normalize_email(email),
            password_hash: None, role: Role::User, provider: provider.trim().to_lowercase(),
            is_verified: true, verification: None, created_at: now, updated_at: now, events: vec![],
        };
        account.raise_event(DomainEvent::Account(AccountEvent::Registered {
            account_id: account.id, email: account.email.clone(), provider: account.provider.clone(),
        }));
        account
    }

    /// Consumes the pending verification. Single use: the token fields are cleared.
    pub fn consume_verification(&mut self, now: DateTime<Utc>) -> Result<(), AccountError> {
        let pending = self.verification.as_ref().ok_or(AccountError::NoPendingVerification)?;
        if now > pending.expires_at { return Err(AccountError::VerificationExpired); }
        self.verification = None;
        self.is_verified = true;
        self.touch();
        self.raise_event(DomainEvent::Account(AccountEvent::Verified { account_id: self.id }));
        Ok(())
    }

    pub fn change_role(&mut self, role: Role) {
        self.role = role;
        self.touch();
        self.raise_event(DomainEvent::Account(AccountEvent::RoleChanged { account_id: self.id, role }));
    }

    pub fn request_verification_email(&mut self, verify_url: String) {
        self.raise_event(DomainEvent::Account(AccountEvent::VerificationRequested {
            account_id: self.id, email: self.email.clone(), verify_url,
        }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("no verification pending")]
    NoPendingVerification,
    #[error("verification token expired")]
    VerificationExpired,
}
