//! iStore - storefront and back-office service for an Apple-product retailer
//!
//! ## Features
//! - Product catalog with color, storage and region variants priced as deltas
//! - Server-side cart pricing and order placement with total validation
//! - "Notify me when in stock" subscriptions
//! - Email/password accounts with email verification, identity-provider exchange
//! - Role-gated admin dashboard for catalog, orders and users

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use routes::router;
pub use state::AppState;
