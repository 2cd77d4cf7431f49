use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::lifecycle::domain::{PaymentMethod, PlanType, SubscriptionPlan};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub marketplace: MarketplaceConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let currency = env::var("APP_CURRENCY")
            .map(|value| value.trim().to_ascii_uppercase())
            .unwrap_or_else(|_| "INR".to_string());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidCurrency { value: currency });
        }

        let default_payment_method = match env::var("APP_DEFAULT_PAYMENT_METHOD") {
            Ok(raw) => raw
                .parse::<PaymentMethod>()
                .map_err(|_| ConfigError::InvalidPaymentMethod { value: raw })?,
            Err(_) => PaymentMethod::Wallet,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            marketplace: MarketplaceConfig {
                currency,
                default_payment_method,
                plans: MarketplaceConfig::standard_plans(),
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Commercial defaults shared by the lifecycle coordinators.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub currency: String,
    /// Method recorded on the payment placeholder opened alongside a booking.
    pub default_payment_method: PaymentMethod,
    pub plans: Vec<SubscriptionPlan>,
}

impl MarketplaceConfig {
    pub fn standard_plans() -> Vec<SubscriptionPlan> {
        vec![
            SubscriptionPlan {
                id: "basic".to_string(),
                name: "Basic".to_string(),
                plan_type: PlanType::Monthly,
                price: 199,
            },
            SubscriptionPlan {
                id: "plus".to_string(),
                name: "Plus".to_string(),
                plan_type: PlanType::Quarterly,
                price: 499,
            },
            SubscriptionPlan {
                id: "premium".to_string(),
                name: "Premium".to_string(),
                plan_type: PlanType::Yearly,
                price: 1499,
            },
        ]
    }

    pub fn plan(&self, plan_id: &str) -> Option<&SubscriptionPlan> {
        self.plans.iter().find(|plan| plan.id == plan_id)
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            default_payment_method: PaymentMethod::Wallet,
            plans: Self::standard_plans(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCurrency { value: String },
    InvalidPaymentMethod { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCurrency { value } => {
                write!(f, "APP_CURRENCY must be a three letter code, got '{}'", value)
            }
            ConfigError::InvalidPaymentMethod { value } => write!(
                f,
                "APP_DEFAULT_PAYMENT_METHOD must be one of card, netbanking, UPI, wallet, cash; got '{}'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidCurrency { .. }
            | ConfigError::InvalidPaymentMethod { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_CURRENCY");
        env::remove_var("APP_DEFAULT_PAYMENT_METHOD");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.marketplace.currency, "INR");
        assert_eq!(
            config.marketplace.default_payment_method,
            PaymentMethod::Wallet
        );
        assert_eq!(config.marketplace.plans.len(), 3);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_unknown_payment_method() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_DEFAULT_PAYMENT_METHOD", "barter");
        let err = AppConfig::load().expect_err("unknown method rejected");
        assert!(matches!(err, ConfigError::InvalidPaymentMethod { .. }));
        reset_env();
    }

    #[test]
    fn plan_lookup_resolves_catalog_entries() {
        let config = MarketplaceConfig::default();
        let plan = config.plan("plus").expect("plus plan present");
        assert_eq!(plan.plan_type, PlanType::Quarterly);
        assert!(config.plan("platinum").is_none());
    }
}
