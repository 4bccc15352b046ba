//! HTTP surface.

mod account;
mod auth;
mod checkout;
mod dashboard;
mod orders;
mod products;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::{header, request::Parts as RequestParts, HeaderName, HeaderValue, Method},
    middleware,
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use validator::Validate;

use crate::auth::session::require_session;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::Page;

pub(crate) const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

/// Build the service router.
pub fn router(state: AppState) -> Router {
    // Dashboard and checkout pages bounce anonymous visitors to the login page.
    let guarded = Router::new()
        .merge(dashboard::routes())
        .merge(checkout::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health))
        .merge(products::routes())
        .merge(orders::routes())
        .merge(auth::routes())
        .merge(account::routes())
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
        .layer(cors(&state.config().storefront_origin))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "istore"}))
}

/// Catalog reads are public to any origin; everything else only to the
/// storefront.
fn cors(storefront_origin: &str) -> CorsLayer {
    let storefront = HeaderValue::from_str(storefront_origin).ok();
    if storefront.is_none() {
        tracing::warn!(origin = storefront_origin, "STOREFRONT_ORIGIN is not a valid header value; cross-origin writes disabled");
    }

    let allow = AllowOrigin::predicate(move |origin: &HeaderValue, parts: &RequestParts| {
        storefront.as_ref() == Some(origin) || is_catalog_read(parts)
    });

    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, IDEMPOTENCY_KEY])
}

fn is_catalog_read(parts: &RequestParts) -> bool {
    if !parts.uri.path().starts_with("/products/") {
        return false;
    }
    // Preflights announce the method they are asking about.
    let method = if parts.method == Method::OPTIONS {
        parts.headers.get(header::ACCESS_CONTROL_REQUEST_METHOD).and_then(|m| m.to_str().ok())
    } else {
        Some(parts.method.as_str())
    };
    method == Some("GET")
}

/// JSON body that is deserialized and validated; both failures answer 400.
pub(crate) struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListParams {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.per_page)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: Page) -> Self {
        Self { data, total, page: page.page, per_page: page.per_page }
    }
}
