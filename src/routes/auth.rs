//! Signup, email verification, login and identity-provider exchange.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderName, StatusCode},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ValidatedJson;
use crate::auth::{AuthError, AuthService};
use crate::domain::aggregates::Account;
use crate::error::Result;
use crate::state::AppState;

const PROVIDER_SECRET: HeaderName = HeaderName::from_static("x-provider-secret");

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/verify-email", get(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/provider", post(provider_exchange))
}

fn service(state: &AppState) -> AuthService<'_> {
    AuthService::new(state.store(), state.config().verification_token_ttl)
}

#[derive(Debug, Deserialize, Validate)]
struct SignupRequest {
    #[validate(length(min = 1, max = 50))]
    username: String,
    #[validate(email)]
    email: String,
    password: String,
}

async fn signup(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<SignupRequest>,
) -> Result<(StatusCode, Json<Account>)> {
    let (mut account, token) = service(&state)
        .register_with_password(&body.username, &body.email, &body.password, Utc::now())
        .await?;

    // The mailer picks this up; the plaintext token never reaches the store.
    let verify_url = format!("{}/auth/verify-email?token={token}", state.config().base_url);
    account.request_verification_email(verify_url);
    state.publish(account.take_events()).await;

    Ok((StatusCode::CREATED, Json(account)))
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    token: Option<String>,
}

async fn verify_email(State(state): State<AppState>, Query(params): Query<VerifyParams>) -> Result<Redirect> {
    let token = params.token.ok_or(AuthError::InvalidToken)?;
    let mut account = service(&state).verify_email(&token, Utc::now()).await?;
    state.publish(account.take_events()).await;

    Ok(Redirect::to(&format!("{}/login?verified=true", state.config().base_url)))
}

#[derive(Debug, Deserialize, Validate)]
struct LoginRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    token: String,
    account: Account,
}

fn session_response(state: &AppState, account: Account) -> Result<Json<SessionResponse>> {
    let token = state.sessions().issue(&account, Utc::now()).map_err(AuthError::from)?;
    Ok(Json(SessionResponse { token, account }))
}

async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let account = service(&state).login_with_password(&body.email, &body.password).await?;
    tracing::info!(account_id = %account.id, "Login");
    session_response(&state, account)
}

#[derive(Debug, Deserialize, Validate)]
struct ProviderRequest {
    #[validate(length(min = 1, max = 50))]
    provider: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 1, max = 100))]
    username: String,
}

/// Exchanges a login completed by the external identity provider for a
/// local session. Only callers holding the shared provider secret may use it.
async fn provider_exchange(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<ProviderRequest>,
) -> Result<Json<SessionResponse>> {
    let expected = state.config().auth_provider_secret.as_ref().ok_or(AuthError::ProviderRejected)?;
    let presented = headers.get(PROVIDER_SECRET).and_then(|v| v.to_str().ok());
    if presented != Some(expected.expose_secret()) {
        tracing::warn!(provider = %body.provider, "Provider exchange rejected");
        return Err(AuthError::ProviderRejected.into());
    }

    let mut account = service(&state).login_with_provider(&body.provider, &body.username, &body.email).await?;
    state.publish(account.take_events()).await;
    tracing::info!(account_id = %account.id, provider = %body.provider, "Provider login");
    session_response(&state, account)
}
