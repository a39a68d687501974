//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use kv_store::KvStore;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health: reports whether the store answers.
pub async fn check<S: KvStore + Clone + 'static>(
    State(store): State<S>,
) -> (StatusCode, Json<HealthResponse>) {
    match store.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok" })),
        Err(e) => {
            tracing::warn!(error = %e, "store ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                }),
            )
        }
    }
}
