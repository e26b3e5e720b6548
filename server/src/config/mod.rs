use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEV_JWT_SECRET: &str = "cinema-dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set when PAYMENT_GATEWAY=stripe")]
    MissingStripeSetting(&'static str),

    #[error("JWT_SECRET must be set in production")]
    DevJwtSecretInProduction,

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Stripe,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub payment_gateway: GatewayKind,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_base: String,
    pub payment_currency: String,
    pub payment_timeout: Duration,
    pub pending_ticket_ttl: Duration,
    pub pending_sweep_interval: Duration,
    pub store_backend: StoreBackend,
    pub cors_allowed_origins: String,
    pub production: bool,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let payment_gateway = match var("PAYMENT_GATEWAY").as_deref() {
            None | Some("stripe") => GatewayKind::Stripe,
            Some("mock") => GatewayKind::Mock,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "PAYMENT_GATEWAY",
                    value: other.to_string(),
                })
            }
        };

        let store_backend = match var("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost/cinema".to_string()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            server_host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parsed("SERVER_PORT", 3001)?,
            jwt_secret: var("JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string()),
            token_ttl_hours: parsed("TOKEN_TTL_HOURS", 24)?,
            payment_gateway,
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base: var("STRIPE_API_BASE")
                .unwrap_or_else(|| crate::gateway::stripe::DEFAULT_API_BASE.to_string()),
            payment_currency: var("PAYMENT_CURRENCY")
                .unwrap_or_else(|| "idr".to_string())
                .to_lowercase(),
            payment_timeout: Duration::from_secs(parsed("PAYMENT_TIMEOUT_SECS", 10)?),
            pending_ticket_ttl: Duration::from_secs(parsed("PENDING_TICKET_TTL_SECS", 900)?),
            pending_sweep_interval: Duration::from_secs(parsed(
                "PENDING_SWEEP_INTERVAL_SECS",
                60,
            )?),
            store_backend,
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| cors::DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: is_production(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payment_gateway == GatewayKind::Stripe {
            if self.stripe_secret_key.is_none() {
                return Err(ConfigError::MissingStripeSetting("STRIPE_SECRET_KEY"));
            }
            if self.stripe_webhook_secret.is_none() {
                return Err(ConfigError::MissingStripeSetting("STRIPE_WEBHOOK_SECRET"));
            }
        }
        if self.production && self.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::DevJwtSecretInProduction);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

pub fn is_production() -> bool {
    env::var("RUST_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database_url: "postgres://localhost/cinema".into(),
            database_max_connections: 5,
            server_host: "0.0.0.0".into(),
            server_port: 3001,
            jwt_secret: DEV_JWT_SECRET.into(),
            token_ttl_hours: 24,
            payment_gateway: GatewayKind::Mock,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: "https://api.stripe.com".into(),
            payment_currency: "idr".into(),
            payment_timeout: Duration::from_secs(10),
            pending_ticket_ttl: Duration::from_secs(900),
            pending_sweep_interval: Duration::from_secs(60),
            store_backend: StoreBackend::Memory,
            cors_allowed_origins: cors::DEFAULT_ALLOWED_ORIGINS.into(),
            production: false,
        }
    }

    #[test]
    fn test_mock_gateway_needs_no_keys() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_stripe_requires_keys() {
        let mut config = config();
        config.payment_gateway = GatewayKind::Stripe;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingStripeSetting("STRIPE_SECRET_KEY"))
        ));

        config.stripe_secret_key = Some("sk_test".into());
        config.stripe_webhook_secret = Some("whsec".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_rejects_dev_secret() {
        let mut config = config();
        config.production = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DevJwtSecretInProduction)
        ));
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(config().bind_address(), "0.0.0.0:3001");
    }
}
