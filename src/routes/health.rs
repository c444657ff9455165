use axum::Extension;
use axum::Json;
use serde::Serialize;

use crate::middleware::TraceId;
use crate::types::api::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health_check(Extension(trace): Extension<TraceId>) -> Json<ApiResponse<HealthData>> {
    ApiResponse::ok(
        trace.0,
        HealthData {
            status: "healthy",
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}
