//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `JWT_SECRET` - Token signing secret (min 32 chars)
//! - `DATABASE_URL` - `PostgreSQL` connection string (unless `STORE=memory`)
//!
//! ## Optional
//! - `STORE` - `postgres` (default) or `memory`
//! - `HOST` / `PORT` - Bind address (default: 0.0.0.0:8083)
//! - `JWT_TTL_HOURS` - Token lifetime (default: 24)
//! - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET` - Payment processor keys
//! - `STRIPE_API_BASE` - Processor API base URL (default: https://api.stripe.com)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM` - Mail delivery
//! - `NATS_URL` - Publish domain events when set
//! - `ADMIN_EMAIL`, `ADMIN_PASSWORD` - Bootstrap admin account
//! - `CORS_ORIGIN` - Allowed browser origin (default: any)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const DEFAULT_PORT: u16 = 8083;
const DEFAULT_JWT_TTL_HOURS: i64 = 24;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend { Postgres, Memory }

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    /// Present whenever `store` is `Postgres`.
    pub database_url: Option<SecretString>,
    pub host: IpAddr,
    pub port: u16,
    pub jwt: JwtConfig,
    pub payments: Option<PaymentsConfig>,
    pub smtp: Option<SmtpConfig>,
    pub nats_url: Option<String>,
    pub admin: Option<AdminBootstrap>,
    pub cors_origin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: SecretString,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    /// Load configuration through an arbitrary lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let store = match get("STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => return Err(ConfigError::InvalidEnvVar("STORE".into(), format!("unknown backend {other}"))),
        };
        let database_url = match store {
            StoreBackend::Postgres => Some(SecretString::from(require("DATABASE_URL")?)),
            StoreBackend::Memory => None,
        };

        let host = match get("HOST") {
            Some(h) => h.parse().map_err(|_| ConfigError::InvalidEnvVar("HOST".into(), h))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;

        let secret = require("JWT_SECRET")?;
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::InvalidEnvVar(
                "JWT_SECRET".into(),
                format!("must be at least {MIN_JWT_SECRET_LENGTH} characters"),
            ));
        }
        let ttl_hours = parse_or("JWT_TTL_HOURS", get("JWT_TTL_HOURS"), DEFAULT_JWT_TTL_HOURS)?;
        if ttl_hours <= 0 {
            return Err(ConfigError::InvalidEnvVar("JWT_TTL_HOURS".into(), "must be positive".into()));
        }

        let payments = match (get("STRIPE_SECRET_KEY"), get("STRIPE_WEBHOOK_SECRET")) {
            (Some(key), Some(webhook)) => Some(PaymentsConfig {
                secret_key: SecretString::from(key),
                webhook_secret: SecretString::from(webhook),
                api_base: get("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("STRIPE_WEBHOOK_SECRET".into())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("STRIPE_SECRET_KEY".into())),
        };

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
                username: require("SMTP_USERNAME")?,
                password: SecretString::from(require("SMTP_PASSWORD")?),
                from_address: require("SMTP_FROM")?,
            }),
            None => None,
        };

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password: SecretString::from(password) }),
            _ => None,
        };

        Ok(Self {
            store,
            database_url,
            host,
            port,
            jwt: JwtConfig { secret: SecretString::from(secret), ttl_hours },
            payments,
            smtp,
            nats_url: get("NATS_URL"),
            admin,
            cors_origin: get("CORS_ORIGIN"),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidEnvVar(key.to_string(), v)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_memory_store_defaults() {
        let config = load(&[("STORE", "memory"), ("JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.database_url.is_none());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.jwt.ttl_hours, DEFAULT_JWT_TTL_HOURS);
        assert!(config.payments.is_none());
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = load(&[("JWT_SECRET", SECRET)]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "DATABASE_URL"));
    }

    #[test]
    fn test_rejects_short_jwt_secret() {
        let err = load(&[("STORE", "memory"), ("JWT_SECRET", "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "JWT_SECRET"));
    }

    #[test]
    fn test_payments_need_both_keys() {
        let err = load(&[("STORE", "memory"), ("JWT_SECRET", SECRET), ("STRIPE_SECRET_KEY", "sk_test")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "STRIPE_WEBHOOK_SECRET"));

        let config = load(&[
            ("STORE", "memory"),
            ("JWT_SECRET", SECRET),
            ("STRIPE_SECRET_KEY", "sk_test"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_test"),
            ("PORT", "9000"),
        ])
        .unwrap();
        let payments = config.payments.unwrap();
        assert_eq!(payments.api_base, DEFAULT_STRIPE_API_BASE);
        assert_eq!(payments.webhook_secret.expose_secret(), "whsec_test");
        assert_eq!(config.port, 9000);
    }
}
