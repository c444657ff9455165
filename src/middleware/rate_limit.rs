use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::auth::API_KEY_HEADER;
use super::client_ip;
use crate::errors::{AppError, ErrorCode};
use crate::AppState;

/// Fixed-window rate limit keyed by `(path, scope)` where scope is the
/// API key when present, else the client IP.
///
/// This path fails closed: with the cache missing or erroring the request
/// is refused rather than admitted unmetered.
pub async fn http_rate_limit(
    State(state): State<Arc<AppState>>,
    matched_path: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let cfg = state.runtime.config();
    if !cfg.rate_limit_enabled {
        return next.run(req).await;
    }

    let Some(redis) = state.redis.as_ref() else {
        return AppError::code(ErrorCode::RateLimitUnavailable).into_response();
    };

    let scope = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| client_ip(&req));
    let path = matched_path
        .as_ref()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let key = format!("rl:{path}:{scope}");

    match redis
        .rate_limit_check(&key, cfg.rate_limit_max_requests, cfg.rate_limit_window_seconds)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => AppError::code(ErrorCode::RateLimited).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "rate limit counter unavailable");
            AppError::code(ErrorCode::RateLimitError).into_response()
        }
    }
}
