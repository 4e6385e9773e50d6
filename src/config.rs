use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Falls back to a development secret when unset.
    pub jwt_secret: Option<String>,
    pub match_queue_size: usize,
    pub event_buffer_size: usize,
    pub pricing: PricingConfig,
    pub dispatch: DispatchConfig,
    pub payments: PaymentConfig,
    pub seed_path: Option<String>,
}

/// Fee parameters, all in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingConfig {
    pub base_fee: i64,
    pub per_km_rate: i64,
    pub max_fee: i64,
    pub max_delivery_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    pub driver_match_radius_km: f64,
    pub available_orders_radius_km: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfig {
    pub currency: String,
    pub settlement_delay_ms: u64,
    pub payment_timeout_secs: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fee: 500,
            per_km_rate: 100,
            max_fee: 2000,
            max_delivery_km: 15.0,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            driver_match_radius_km: 10.0,
            available_orders_radius_km: 10.0,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            settlement_delay_ms: 5_000,
            payment_timeout_secs: 900,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            jwt_secret: None,
            match_queue_size: 1024,
            event_buffer_size: 256,
            pricing: PricingConfig::default(),
            dispatch: DispatchConfig::default(),
            payments: PaymentConfig::default(),
            seed_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = Config::default();
        let pricing_defaults = defaults.pricing;
        let dispatch_defaults = defaults.dispatch;
        let payment_defaults = defaults.payments;

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!("invalid LOG_FORMAT: {other}")));
            }
        };

        let pricing = PricingConfig {
            base_fee: parse_or_default("BASE_DELIVERY_FEE", pricing_defaults.base_fee)?,
            per_km_rate: parse_or_default("PER_KM_RATE", pricing_defaults.per_km_rate)?,
            max_fee: parse_or_default("MAX_DELIVERY_FEE", pricing_defaults.max_fee)?,
            max_delivery_km: parse_or_default("MAX_DELIVERY_KM", pricing_defaults.max_delivery_km)?,
        };
        if pricing.base_fee < 0 || pricing.per_km_rate < 0 || pricing.max_fee < pricing.base_fee {
            return Err(AppError::Internal(
                "delivery fee settings must be non-negative with MAX_DELIVERY_FEE >= BASE_DELIVERY_FEE"
                    .to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            jwt_secret: env::var("JWT_SECRET").ok(),
            match_queue_size: parse_or_default("MATCH_QUEUE_SIZE", defaults.match_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            pricing,
            dispatch: DispatchConfig {
                driver_match_radius_km: parse_or_default(
                    "DRIVER_MATCH_RADIUS_KM",
                    dispatch_defaults.driver_match_radius_km,
                )?,
                available_orders_radius_km: parse_or_default(
                    "AVAILABLE_ORDERS_RADIUS_KM",
                    dispatch_defaults.available_orders_radius_km,
                )?,
            },
            payments: PaymentConfig {
                currency: env::var("CURRENCY").unwrap_or(payment_defaults.currency),
                settlement_delay_ms: parse_or_default(
                    "SETTLEMENT_DELAY_MS",
                    payment_defaults.settlement_delay_ms,
                )?,
                payment_timeout_secs: parse_or_default(
                    "PAYMENT_TIMEOUT_SECS",
                    payment_defaults.payment_timeout_secs,
                )?,
            },
            seed_path: env::var("SEED_PATH").ok(),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
