use std::{net::SocketAddr, str::FromStr, time::Duration};

use axum::http::HeaderValue;
use env_helpers::get_env_default;
use secrecy::SecretString;
use url::Url;

use crate::infra::error::InfraError;

/// Which [`PaymentGatewayPort`](crate::application::ports::payment_gateway::PaymentGatewayPort)
/// implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Live,
    Sandbox,
}

impl FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(GatewayMode::Live),
            "sandbox" => Ok(GatewayMode::Sandbox),
            other => Err(format!("unknown gateway mode '{}'", other)),
        }
    }
}

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub cors_origin: HeaderValue,
    pub jwt_secret: SecretString,
    pub gateway_mode: GatewayMode,
    pub gateway_base_url: Url,
    /// Public key id, also handed to checkout clients.
    pub gateway_key_id: String,
    pub gateway_key_secret: SecretString,
    pub gateway_webhook_secret: SecretString,
    pub gateway_timeout: Duration,
    pub default_currency: String,
    pub rollover_interval: Duration,
    /// JSON log file; console-only logging when unset.
    pub log_file: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let bind_addr: SocketAddr = parse(
            "BIND_ADDR",
            get_env_default("BIND_ADDR", "127.0.0.1:3001".to_string()),
        )?;
        let database_url = required("DATABASE_URL")?;
        let database_max_connections: u32 = get_env_default("DATABASE_MAX_CONNECTIONS", 10);
        let cors_origin: HeaderValue = parse(
            "CORS_ORIGIN",
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000")),
        )?;

        let jwt_secret = SecretString::new(required("JWT_SECRET")?.into());

        let gateway_mode: GatewayMode =
            parse("GATEWAY_MODE", get_env_default("GATEWAY_MODE", "live".to_string()))?;
        let gateway_base_url: Url = parse(
            "GATEWAY_BASE_URL",
            get_env_default(
                "GATEWAY_BASE_URL",
                "https://api.razorpay.com/v1".to_string(),
            ),
        )?;
        let gateway_key_id = required("GATEWAY_KEY_ID")?;
        let gateway_key_secret = SecretString::new(required("GATEWAY_KEY_SECRET")?.into());
        let gateway_webhook_secret = SecretString::new(required("GATEWAY_WEBHOOK_SECRET")?.into());
        let gateway_timeout_secs: u64 = get_env_default("GATEWAY_TIMEOUT_SECS", 10);

        let default_currency: String =
            get_env_default("DEFAULT_CURRENCY", "INR".to_string()).to_uppercase();
        let rollover_interval_secs: u64 = get_env_default("ROLLOVER_INTERVAL_SECS", 300);
        let log_file = std::env::var("LOG_FILE").ok().filter(|s| !s.is_empty());

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections,
            cors_origin,
            jwt_secret,
            gateway_mode,
            gateway_base_url,
            gateway_key_id,
            gateway_key_secret,
            gateway_webhook_secret,
            gateway_timeout: Duration::from_secs(gateway_timeout_secs),
            default_currency,
            rollover_interval: Duration::from_secs(rollover_interval_secs.max(1)),
            log_file,
        })
    }
}

fn required(var: &'static str) -> Result<String, InfraError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(InfraError::ConfigMissing { var })
}

fn parse<T>(var: &'static str, raw: String) -> Result<T, InfraError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| InfraError::ConfigInvalid {
        var,
        reason: e.to_string(),
    })
}
