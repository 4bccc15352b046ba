//! Signed session tokens and the extractors that read them.
//!
//! A session is an HS256 JWT carried as `Authorization: Bearer <token>`. The
//! role is captured when the token is issued, so a role change applies from
//! the next login.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;
use crate::domain::aggregates::Account;
use crate::domain::role::{Permission, Role};
use crate::error::AppError;
use crate::state::AppState;

const SESSION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn allows(&self, permission: Permission) -> bool {
        self.role.allows(permission)
    }

    /// Role gate: 403 unless the session's role grants `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.allows(permission) {
            Ok(())
        } else {
            tracing::debug!(account_id = %self.sub, role = %self.role, ?permission, "Permission denied");
            Err(AppError::Forbidden("insufficient permissions".into()))
        }
    }
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &SecretString) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    pub fn issue(&self, account: &Account, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: account.id,
            email: account.email.clone(),
            role: account.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn decode(&self, token: &str) -> Result<SessionClaims, AuthError> {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidSession)
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}

fn session_from(parts: &Parts, state: &AppState) -> Option<Result<SessionClaims, AuthError>> {
    if let Some(claims) = parts.extensions.get::<SessionClaims>() {
        return Some(Ok(claims.clone()));
    }
    extract_bearer(&parts.headers).map(|token| state.sessions().decode(token))
}

/// Extractor that requires a valid session. Rejects with 401.
pub struct CurrentUser(pub SessionClaims);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match session_from(parts, state) {
            Some(claims) => Ok(Self(claims?)),
            None => Err(AppError::Unauthorized("sign in required".into())),
        }
    }
}

/// Extractor for routes open to guests. An invalid token counts as no session.
pub struct OptionalUser(pub Option<SessionClaims>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(session_from(parts, state).and_then(Result::ok)))
    }
}

/// Route guard for the dashboard and checkout pages.
///
/// Without a valid session the browser is sent to the login page with the
/// requested path as `callbackUrl`. A valid session is stashed in the request
/// extensions for the handlers' extractors.
pub async fn require_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = extract_bearer(req.headers()).and_then(|token| state.sessions().decode(token).ok());

    match claims {
        Some(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        None => {
            let path = req.uri().path_and_query().map_or("/", |p| p.as_str());
            tracing::debug!(path, "No session, redirecting to login");
            Redirect::to(&format!("/login?callbackUrl={}", urlencoding::encode(path))).into_response()
        }
    }
}
