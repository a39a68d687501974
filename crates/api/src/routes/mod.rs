//! HTTP handlers, one module per service.

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod stock;

use crate::error::ApiError;

/// Extracts a query parameter that must be present and non-empty.
pub(crate) fn required(
    value: Option<String>,
    missing: impl FnOnce() -> ApiError,
) -> Result<String, ApiError> {
    value.filter(|v| !v.is_empty()).ok_or_else(missing)
}

/// Parses a JSON request body, answering 400 when it is malformed.
pub(crate) fn json_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid payload: {e}")))
}
