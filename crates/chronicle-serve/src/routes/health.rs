//! Liveness endpoints.

use axum::Json;
use serde::Serialize;

/// Root banner response.
#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    message: &'static str,
}

/// `GET /`
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Chronicle is running...",
    })
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    message: &'static str,
}

/// `GET /health`
///
/// Always `{"message": "healthy"}` while the server is up; load balancers
/// can poll it.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { message: "healthy" })
}
