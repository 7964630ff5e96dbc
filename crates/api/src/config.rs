//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{RetryPolicy, SagaConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Payment gateway credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub server_key: String,
    pub production: bool,
}

/// Fulfillment provider credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_id: String,
    pub api_key: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT` — bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for JSON lines, anything else for text
/// - `DATABASE_URL` — PostgreSQL; absent selects the in-memory store
/// - `GATEWAY_SERVER_KEY`, `GATEWAY_PRODUCTION` — absent key selects the
///   in-memory gateway
/// - `PROVIDER_BASE_URL`, `PROVIDER_API_ID`, `PROVIDER_API_KEY` — all three
///   required, otherwise the in-memory provider is used
/// - `ORDER_NUMBER_PREFIX` (default `TU`), `PAYMENT_TTL_HOURS` (default 24)
/// - `FULFILLMENT_MAX_ATTEMPTS` (default 3), `FULFILLMENT_BACKOFF_MS`
///   (default 500)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub gateway: Option<GatewayConfig>,
    pub provider: Option<ProviderConfig>,
    pub order_number_prefix: String,
    pub payment_ttl_hours: i64,
    pub fulfillment_max_attempts: u32,
    pub fulfillment_backoff_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let gateway = var("GATEWAY_SERVER_KEY").map(|server_key| GatewayConfig {
            server_key,
            production: var("GATEWAY_PRODUCTION")
                .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        });

        let provider = match (
            var("PROVIDER_BASE_URL"),
            var("PROVIDER_API_ID"),
            var("PROVIDER_API_KEY"),
        ) {
            (Some(base_url), Some(api_id), Some(api_key)) => Some(ProviderConfig {
                base_url,
                api_id,
                api_key,
            }),
            _ => None,
        };

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL"),
            gateway,
            provider,
            order_number_prefix: var("ORDER_NUMBER_PREFIX")
                .unwrap_or(defaults.order_number_prefix),
            payment_ttl_hours: var("PAYMENT_TTL_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(defaults.payment_ttl_hours),
            fulfillment_max_attempts: var("FULFILLMENT_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.fulfillment_max_attempts),
            fulfillment_backoff_ms: var("FULFILLMENT_BACKOFF_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fulfillment_backoff_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to the order manager and reconciliation engine.
    pub fn saga_config(&self) -> SagaConfig {
        let initial_backoff = Duration::from_millis(self.fulfillment_backoff_ms);
        SagaConfig {
            order_number_prefix: self.order_number_prefix.clone(),
            payment_ttl: chrono::Duration::hours(self.payment_ttl_hours),
            retry: RetryPolicy {
                max_attempts: self.fulfillment_max_attempts,
                initial_backoff,
                max_backoff: initial_backoff.saturating_mul(8),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            gateway: None,
            provider: None,
            order_number_prefix: "TU".to_string(),
            payment_ttl_hours: 24,
            fulfillment_max_attempts: 3,
            fulfillment_backoff_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.gateway.is_none());
        assert!(config.provider.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "json"),
            ("DATABASE_URL", "postgres://localhost/topup"),
            ("GATEWAY_SERVER_KEY", "SB-Mid-server-abc"),
            ("GATEWAY_PRODUCTION", "true"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/topup")
        );
        assert_eq!(
            config.gateway,
            Some(GatewayConfig {
                server_key: "SB-Mid-server-abc".to_string(),
                production: true,
            })
        );
    }

    #[test]
    fn test_provider_needs_all_credentials() {
        let partial = config_from(&[
            ("PROVIDER_BASE_URL", "https://provider.example"),
            ("PROVIDER_API_ID", "id"),
        ]);
        assert!(partial.provider.is_none());

        let full = config_from(&[
            ("PROVIDER_BASE_URL", "https://provider.example"),
            ("PROVIDER_API_ID", "id"),
            ("PROVIDER_API_KEY", "key"),
        ]);
        assert_eq!(full.provider.map(|p| p.api_key), Some("key".to_string()));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = config_from(&[
            ("PORT", "http"),
            ("PAYMENT_TTL_HOURS", "0"),
            ("FULFILLMENT_MAX_ATTEMPTS", "-1"),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.payment_ttl_hours, 24);
        assert_eq!(config.fulfillment_max_attempts, 3);
    }

    #[test]
    fn test_saga_config() {
        let config = config_from(&[
            ("ORDER_NUMBER_PREFIX", "GG"),
            ("PAYMENT_TTL_HOURS", "2"),
            ("FULFILLMENT_MAX_ATTEMPTS", "5"),
            ("FULFILLMENT_BACKOFF_MS", "100"),
        ]);
        let saga = config.saga_config();
        assert_eq!(saga.order_number_prefix, "GG");
        assert_eq!(saga.payment_ttl, chrono::Duration::hours(2));
        assert_eq!(saga.retry.max_attempts, 5);
        assert_eq!(saga.retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(saga.retry.max_backoff, Duration::from_millis(800));
    }
}
