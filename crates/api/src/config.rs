//! Application configuration loaded from environment variables.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string (default: `None`, uses in-memory stores)
/// - `DB_MAX_CONNECTIONS` — max database pool connections (default: `10`)
/// - `CATALOG_BASE_URL` — catalog service base URL (default: `None`, uses in-memory catalog)
/// - `PAYMENT_BASE_URL` — payment gateway base URL (default: `None`, uses in-memory gateway)
/// - `INVENTORY_BASE_URL` — remote inventory service (default: `None`, in-process engine)
/// - `CATALOG_TIMEOUT_SECS` / `INVENTORY_TIMEOUT_SECS` / `PAYMENT_TIMEOUT_SECS` —
///   per-hop call timeouts (defaults: 5 / 8 / 10)
/// - `TAX_RATE` — order tax rate (default: `0.05`)
/// - `RESERVATION_TTL_MINUTES` — reservation hold time (default: `15`)
/// - `LOW_STOCK_THRESHOLD` — availability warning level (default: `10`)
/// - `REAPER_INTERVAL_SECS` — background expiry sweep period (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub catalog_base_url: Option<String>,
    pub payment_base_url: Option<String>,
    pub inventory_base_url: Option<String>,
    pub catalog_timeout_secs: u64,
    pub inventory_timeout_secs: u64,
    pub payment_timeout_secs: u64,
    pub tax_rate: Decimal,
    pub reservation_ttl_minutes: i64,
    pub low_stock_threshold: i64,
    pub reaper_interval_secs: u64,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            catalog_base_url: std::env::var("CATALOG_BASE_URL").ok(),
            payment_base_url: std::env::var("PAYMENT_BASE_URL").ok(),
            inventory_base_url: std::env::var("INVENTORY_BASE_URL").ok(),
            catalog_timeout_secs: env_parse("CATALOG_TIMEOUT_SECS", 5),
            inventory_timeout_secs: env_parse("INVENTORY_TIMEOUT_SECS", 8),
            payment_timeout_secs: env_parse("PAYMENT_TIMEOUT_SECS", 10),
            tax_rate: env_parse("TAX_RATE", Decimal::new(5, 2)),
            reservation_ttl_minutes: env_parse("RESERVATION_TTL_MINUTES", 15),
            low_stock_threshold: env_parse("LOW_STOCK_THRESHOLD", 10),
            reaper_interval_secs: env_parse("REAPER_INTERVAL_SECS", 300),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            db_max_connections: 10,
            catalog_base_url: None,
            payment_base_url: None,
            inventory_base_url: None,
            catalog_timeout_secs: 5,
            inventory_timeout_secs: 8,
            payment_timeout_secs: 10,
            tax_rate: Decimal::new(5, 2),
            reservation_ttl_minutes: 15,
            low_stock_threshold: 10,
            reaper_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.tax_rate, Decimal::new(5, 2));
        assert_eq!(config.reservation_ttl_minutes, 15);
        assert_eq!(config.low_stock_threshold, 10);
    }

    #[test]
    fn test_per_hop_timeouts() {
        let config = Config::default();
        assert_eq!(config.catalog_timeout_secs, 5);
        assert_eq!(config.inventory_timeout_secs, 8);
        assert_eq!(config.payment_timeout_secs, 10);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
