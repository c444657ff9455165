use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::client_ip;
use crate::errors::AppError;
use crate::services::blacklist_service;
use crate::AppState;

/// Reject requests from blacklisted addresses before they reach auth or
/// the handler. Membership is cache-first with a store fallback.
pub async fn ip_blacklist(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    if blacklist_service::is_blacklisted(&state.db, state.redis.as_ref(), &ip).await {
        tracing::warn!(client_ip = %ip, "blocked blacklisted address");
        return AppError::forbidden().into_response();
    }
    next.run(req).await
}
