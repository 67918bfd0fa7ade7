//! Server Configuration

use std::time::Duration;

use axum::http::HeaderValue;
use checkout_payments::{DEFAULT_RECONCILE_TIMEOUT, PaymentError, Result};

/// Default listening port
pub const DEFAULT_PORT: u16 = 4242;

/// Process-level settings; Stripe settings live in `PaymentsConfig`.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub cors_allowed_origins: Vec<HeaderValue>,
    pub reconcile_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            database_max_connections: 5,
            cors_allowed_origins: Vec::new(),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary key lookup
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = parse_or(value("PORT"), "PORT", defaults.port)?;
        let database_max_connections = positive_or(
            value("DATABASE_MAX_CONNECTIONS"),
            "DATABASE_MAX_CONNECTIONS",
            defaults.database_max_connections,
        )?;
        let reconcile_timeout = Duration::from_secs(positive_or(
            value("RECONCILE_TIMEOUT_SECS"),
            "RECONCILE_TIMEOUT_SECS",
            defaults.reconcile_timeout.as_secs(),
        )?);

        let cors_allowed_origins = value("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(|origin| {
                        HeaderValue::from_str(origin).map_err(|_| {
                            PaymentError::Config(format!("invalid CORS origin {origin:?}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            port,
            database_url: value("DATABASE_URL"),
            database_max_connections,
            cors_allowed_origins,
            reconcile_timeout,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    value.map_or(Ok(default), |v| {
        v.parse()
            .map_err(|_| PaymentError::Config(format!("{key} has invalid value {v:?}")))
    })
}

fn positive_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + Default + PartialOrd,
{
    let parsed = parse_or(value, key, default)?;
    if parsed > T::default() {
        Ok(parsed)
    } else {
        Err(PaymentError::Config(format!("{key} must be a positive integer")))
    }
}
