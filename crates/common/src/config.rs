use std::str::FromStr;

use crate::{Error, Result};

/// Runtime settings read from environment variables at startup.
/// Every variable is optional; malformed values are rejected with the
/// variable name in the message.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// File the per-run log is written to (truncated each run).
    pub log_file: String,

    /// Capacity of the tick and transaction channels.
    pub channel_capacity: usize,

    // Simulated exchange
    pub fixed_cost: f64,
    pub initial_investment: f64,

    // Binance klines source
    pub binance_api_url: String,
    pub binance_symbol: String,
    pub binance_interval: String,
    pub binance_limit: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_file: "last_run.log".to_string(),
            channel_capacity: 1024,
            fixed_cost: 0.0,
            initial_investment: 0.0,
            binance_api_url: "https://testnet.binance.vision".to_string(),
            binance_symbol: "BTCUSDT".to_string(),
            binance_interval: "5m".to_string(),
            binance_limit: 500,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// if one is present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let channel_capacity = parsed(&lookup, "CHANNEL_CAPACITY", defaults.channel_capacity)?;
        if channel_capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "CHANNEL_CAPACITY must be at least 1".to_string(),
            ));
        }

        let binance_limit = parsed(&lookup, "BINANCE_LIMIT", defaults.binance_limit)?;
        if !(1..=1000).contains(&binance_limit) {
            return Err(Error::InvalidConfiguration(format!(
                "BINANCE_LIMIT must be between 1 and 1000, got {binance_limit}"
            )));
        }

        let fixed_cost: f64 = parsed(&lookup, "FAKE_EXCHANGE_FIXED_COST", defaults.fixed_cost)?;
        if !fixed_cost.is_finite() || fixed_cost < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "FAKE_EXCHANGE_FIXED_COST must be a non-negative number, got {fixed_cost}"
            )));
        }

        Ok(Config {
            log_file: lookup("LOG_FILE").unwrap_or(defaults.log_file),
            channel_capacity,
            fixed_cost,
            initial_investment: parsed(
                &lookup,
                "FAKE_EXCHANGE_INITIAL_INVESTMENT",
                defaults.initial_investment,
            )?,
            binance_api_url: lookup("BINANCE_API_URL").unwrap_or(defaults.binance_api_url),
            binance_symbol: lookup("BINANCE_SYMBOL").unwrap_or(defaults.binance_symbol),
            binance_interval: lookup("BINANCE_INTERVAL").unwrap_or(defaults.binance_interval),
            binance_limit,
        })
    }
}

fn parsed<L, T>(lookup: &L, key: &str, default: T) -> Result<T>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            Error::InvalidConfiguration(format!("{key}='{raw}' is not valid: {e}"))
        }),
    }
}
