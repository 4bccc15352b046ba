//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `SESSION_SECRET` - session token signing secret (min 32 chars)
//!
//! ## Optional
//! - `HOST` - bind address (default: 0.0.0.0)
//! - `PORT` - listen port (default: 8083)
//! - `BASE_URL` - public storefront URL used in links (default: http://localhost:3000)
//! - `STOREFRONT_ORIGIN` - origin allowed to call non-catalog routes (default: `BASE_URL`)
//! - `AUTH_PROVIDER_SECRET` - shared secret for identity-provider session exchange
//! - `VERIFICATION_TOKEN_TTL_HOURS` - email verification token lifetime (default: 24)
//! - `DB_MAX_CONNECTIONS` - pool size (default: 10)
//! - `RUN_MIGRATIONS` - apply migrations at startup (default: true)
//! - `NATS_URL` - publish domain events to NATS when set

use std::net::{IpAddr, SocketAddr};

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    pub storefront_origin: String,
    pub session_secret: SecretString,
    pub auth_provider_secret: Option<SecretString>,
    pub verification_token_ttl: Duration,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub nats_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment, reading `.env` first
    /// if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let database_url = SecretString::from(required("DATABASE_URL")?);
        let session_secret = SecretString::from(required("SESSION_SECRET")?);
        if session_secret.expose_secret().len() < MIN_SESSION_SECRET_LENGTH {
            return Err(ConfigError::InvalidEnvVar(
                "SESSION_SECRET".into(),
                format!("must be at least {MIN_SESSION_SECRET_LENGTH} characters"),
            ));
        }

        let host = parse(&get, "HOST", "0.0.0.0")?;
        let port = parse(&get, "PORT", "8083")?;
        let base_url = get("BASE_URL").unwrap_or_else(|| "http://localhost:3000".into()).trim_end_matches('/').to_string();
        let storefront_origin = get("STOREFRONT_ORIGIN").unwrap_or_else(|| base_url.clone());
        let ttl_hours: i64 = parse(&get, "VERIFICATION_TOKEN_TTL_HOURS", "24")?;
        if ttl_hours <= 0 {
            return Err(ConfigError::InvalidEnvVar("VERIFICATION_TOKEN_TTL_HOURS".into(), "must be positive".into()));
        }

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            storefront_origin,
            session_secret,
            auth_provider_secret: get("AUTH_PROVIDER_SECRET").map(SecretString::from),
            verification_token_ttl: Duration::hours(ttl_hours),
            db_max_connections: parse(&get, "DB_MAX_CONNECTIONS", "10")?,
            run_migrations: parse(&get, "RUN_MIGRATIONS", "true")?,
            nats_url: get("NATS_URL"),
        })
    }

    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .unwrap_or_else(|| default.to_string())
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
