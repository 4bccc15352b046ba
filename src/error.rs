//! Unified error handling.
//!
//! Every layer has its own `thiserror` enum; they are folded into [`AppError`]
//! here and turned into a JSON response exactly once, at the HTTP boundary.
//! Server-side failures are logged with their detail and reported to the
//! client with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::domain::aggregates::{AccountError, OrderError, ProductError};
use crate::domain::value_objects::{SkuError, SlugError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or invalid input.
    #[error("{0}")]
    Validation(String),

    /// Well-formed input that breaks a business rule.
    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::InvalidSession | AuthError::ProviderRejected => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
                AuthError::EmailTaken => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidToken | AuthError::TokenExpired => StatusCode::BAD_REQUEST,
                AuthError::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
                AuthError::Store(_) | AuthError::PasswordHash | AuthError::Signing(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(status: StatusCode) -> &'static str {
        match status {
            StatusCode::BAD_REQUEST => "validation_error",
            StatusCode::UNPROCESSABLE_ENTITY => "unprocessable",
            StatusCode::CONFLICT => "conflict",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
            self.to_string()
        };

        (status, Json(ErrorBody { error: Self::code(status), message })).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<ProductError> for AppError {
    fn from(err: ProductError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::TotalMismatch { .. } | OrderError::InvalidTransition { .. } => Self::Unprocessable(err.to_string()),
            OrderError::NoItems
            | OrderError::InvalidQuantity
            | OrderError::NegativePrice
            | OrderError::AmountOutOfRange => Self::Validation(err.to_string()),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        Self::Auth(err.into())
    }
}

impl From<SlugError> for AppError {
    fn from(err: SlugError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<SkuError> for AppError {
    fn from(err: SkuError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
