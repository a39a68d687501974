//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::RetryPolicy;

/// The four services built from this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Orders,
    Products,
    Cart,
    Stock,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Orders => "orders",
            Service::Products => "products",
            Service::Cart => "cart",
            Service::Stock => "stock",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Service::Orders => 8080,
            Service::Products => 8081,
            Service::Cart => 8082,
            Service::Stock => 8083,
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where service state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local map; state is lost on restart and not shared.
    Memory,
    /// A Redis server at `host[:port]`.
    Redis(String),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: per service, 8080 to 8083)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `REDIS_HOST`: store address, or `memory` (default: `"localhost:6379"`)
/// - `STOCK_HOST`: stock service address (default: `"stocks"`)
/// - `ORDERS_HOST`: orders service address (default: `"orders"`)
/// - `REQUEST_TIMEOUT_MS`: timeout for calls to other services (default: 5000)
/// - `CAS_MAX_ATTEMPTS`: optimistic write attempts per counter update (default: 64)
#[derive(Debug, Clone)]
pub struct Config {
    pub service: Service,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub redis_host: String,
    pub stock_host: String,
    pub orders_host: String,
    pub request_timeout: Duration,
    pub cas_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env(service: Service) -> Self {
        Self::from_lookup(service, |key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(service: Service, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::for_service(service);
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            service,
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            redis_host: var("REDIS_HOST").unwrap_or(defaults.redis_host),
            stock_host: var("STOCK_HOST").unwrap_or(defaults.stock_host),
            orders_host: var("ORDERS_HOST").unwrap_or(defaults.orders_host),
            request_timeout: var("REQUEST_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            cas_max_attempts: var("CAS_MAX_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.cas_max_attempts),
        }
    }

    /// Returns the default configuration for a service.
    pub fn for_service(service: Service) -> Self {
        Self {
            service,
            host: "0.0.0.0".to_string(),
            port: service.default_port(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            redis_host: "localhost:6379".to_string(),
            stock_host: "stocks".to_string(),
            orders_host: "orders".to_string(),
            request_timeout: Duration::from_millis(5000),
            cas_max_attempts: 64,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_backend(&self) -> StoreBackend {
        if self.redis_host.eq_ignore_ascii_case("memory") {
            StoreBackend::Memory
        } else {
            StoreBackend::Redis(self.redis_host.clone())
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.cas_max_attempts)
    }
}
