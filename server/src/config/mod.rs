use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_PENDING_HOLD_MINUTES: u64 = 15;
const DEFAULT_SLOT_CACHE_TTL_SECS: u64 = 30;

#[cfg(test)]
pub const TEST_PAYMENT_SECRET: &str = "test_payment_secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must both be set")]
    IncompleteRazorpay,

    #[error("Unknown PAYMENT_GATEWAY '{0}', expected 'razorpay' or 'dummy'")]
    UnknownGateway(String),
}

#[derive(Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
}

#[derive(Clone)]
pub enum PaymentConfig {
    Razorpay(RazorpayConfig),
    Dummy { secret: String },
}

impl PaymentConfig {
    /// Secret used to verify checkout signatures.
    pub fn signing_secret(&self) -> &str {
        match self {
            PaymentConfig::Razorpay(cfg) => &cfg.key_secret,
            PaymentConfig::Dummy { secret } => secret,
        }
    }

    /// `PAYMENT_GATEWAY` picks the gateway. When it is unset, Razorpay keys
    /// select Razorpay and their absence selects the dummy gateway. The
    /// dummy gateway still needs its own `DUMMY_PAYMENT_SECRET`.
    fn from_source(var: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let requested = var("PAYMENT_GATEWAY").map(|v| v.trim().to_lowercase());
        let key_id = var("RAZORPAY_KEY_ID");
        let key_secret = var("RAZORPAY_KEY_SECRET");

        let razorpay = match requested.as_deref() {
            Some("razorpay") => true,
            Some("dummy") => false,
            Some(other) => return Err(ConfigError::UnknownGateway(other.to_string())),
            None => key_id.is_some() || key_secret.is_some(),
        };

        if !razorpay {
            let secret = var("DUMMY_PAYMENT_SECRET")
                .ok_or(ConfigError::Missing("DUMMY_PAYMENT_SECRET"))?;
            tracing::warn!("Payments: using dummy gateway, orders are not sent anywhere");
            return Ok(PaymentConfig::Dummy { secret });
        }

        match (key_id, key_secret) {
            (Some(key_id), Some(key_secret)) => Ok(PaymentConfig::Razorpay(RazorpayConfig {
                key_id,
                key_secret,
                base_url: var("RAZORPAY_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_RAZORPAY_BASE_URL.to_string()),
            })),
            _ => Err(ConfigError::IncompleteRazorpay),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub admin_api_token: Option<String>,
    pub payment: PaymentConfig,
    pub currency: String,
    /// How long an unpaid booking keeps its capacity reserved.
    pub pending_hold: Duration,
    pub slot_cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the config from a variable lookup. Empty values count as unset.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_var(
                &var,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            ),
            bind_addr: parse_var(&var, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001))),
            admin_api_token: var("ADMIN_API_TOKEN"),
            payment: PaymentConfig::from_source(&var)?,
            currency: var("PAYMENT_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            pending_hold: Duration::from_secs(
                60 * parse_var(&var, "PENDING_HOLD_MINUTES", DEFAULT_PENDING_HOLD_MINUTES),
            ),
            slot_cache_ttl: Duration::from_secs(parse_var(
                &var,
                "SLOT_CACHE_TTL_SECS",
                DEFAULT_SLOT_CACHE_TTL_SECS,
            )),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/turf_test".to_string(),
            database_max_connections: 1,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            admin_api_token: Some("admin-test-token".to_string()),
            payment: PaymentConfig::Dummy {
                secret: TEST_PAYMENT_SECRET.to_string(),
            },
            currency: DEFAULT_CURRENCY.to_string(),
            pending_hold: Duration::from_secs(60 * DEFAULT_PENDING_HOLD_MINUTES),
            slot_cache_ttl: Duration::from_secs(DEFAULT_SLOT_CACHE_TTL_SECS),
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match var(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Config: invalid value '{}' for {}, using default", raw, key);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    const DB: (&str, &str) = ("DATABASE_URL", "postgres://localhost/turf");

    #[test]
    fn test_database_url_is_required() {
        let err = load(&[("DUMMY_PAYMENT_SECRET", "s")]).err();
        assert_eq!(err, Some(ConfigError::Missing("DATABASE_URL")));
        let err = load(&[("DATABASE_URL", " "), ("DUMMY_PAYMENT_SECRET", "s")]).err();
        assert_eq!(err, Some(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = load(&[
            DB,
            ("DUMMY_PAYMENT_SECRET", "s"),
            ("PENDING_HOLD_MINUTES", "not-a-number"),
            ("SLOT_CACHE_TTL_SECS", " 5 "),
        ])
        .unwrap();
        assert_eq!(config.pending_hold, Duration::from_secs(15 * 60));
        assert_eq!(config.slot_cache_ttl, Duration::from_secs(5));
        assert_eq!(config.bind_addr.port(), 3001);
    }

    #[test]
    fn test_razorpay_selected_by_keys() {
        let config = load(&[DB, ("RAZORPAY_KEY_ID", "rzp_id"), ("RAZORPAY_KEY_SECRET", "rzp_secret")]).unwrap();
        assert!(matches!(config.payment, PaymentConfig::Razorpay(ref cfg) if cfg.base_url == DEFAULT_RAZORPAY_BASE_URL));
        assert_eq!(config.payment.signing_secret(), "rzp_secret");
    }

    #[test]
    fn test_incomplete_razorpay_never_falls_back() {
        let err = load(&[DB, ("PAYMENT_GATEWAY", "razorpay"), ("RAZORPAY_KEY_ID", "rzp_id"), ("DUMMY_PAYMENT_SECRET", "s")]).err();
        assert_eq!(err, Some(ConfigError::IncompleteRazorpay));

        let err = load(&[DB, ("RAZORPAY_KEY_SECRET", "rzp_secret")]).err();
        assert_eq!(err, Some(ConfigError::IncompleteRazorpay));
    }

    #[test]
    fn test_dummy_gateway_needs_its_own_secret() {
        let err = load(&[DB]).err();
        assert_eq!(err, Some(ConfigError::Missing("DUMMY_PAYMENT_SECRET")));
        let err = load(&[DB, ("PAYMENT_GATEWAY", "dummy"), ("RAZORPAY_KEY_ID", "rzp_id")]).err();
        assert_eq!(err, Some(ConfigError::Missing("DUMMY_PAYMENT_SECRET")));

        let config = load(&[DB, ("PAYMENT_GATEWAY", "Dummy"), ("DUMMY_PAYMENT_SECRET", "local")]).unwrap();
        assert_eq!(config.payment.signing_secret(), "local");
    }

    #[test]
    fn test_unknown_gateway_is_rejected() {
        let err = load(&[DB, ("PAYMENT_GATEWAY", "stripe")]).err();
        assert_eq!(err, Some(ConfigError::UnknownGateway("stripe".to_string())));
    }
}
