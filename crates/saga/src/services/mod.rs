//! Downstream service traits with HTTP and in-process implementations.

pub mod orders;
pub mod stock;

use std::time::Duration;

pub use orders::{HttpOrdersService, LocalOrdersService, OrdersService};
pub use stock::{HttpStockService, InjectedFailure, LocalStockService, StockService};

/// Builds the HTTP client shared by the downstream service clients.
///
/// Every request made through it is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Turns a configured peer address into a base URL.
///
/// Bare `host[:port]` values are reached over plain HTTP.
pub fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
