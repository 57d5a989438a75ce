//! Health check controller

use crate::presentation::models::HealthResponse;
use axum::response::Json;

/// Liveness probe
pub async fn get() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
