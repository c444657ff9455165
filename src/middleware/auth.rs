use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::ApiKeyId;
use crate::crypto;
use crate::errors::{AppError, ErrorCode};
use crate::services::api_key_service;
use crate::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// API-key gate.
///
/// `POST /keys` stays reachable without a key while zero enabled keys
/// exist (the bootstrap window). `/health` is always open, and `/config`
/// and `/metrics` open up when the operator flags them public. Rejections
/// use distinct codes so callers can tell a missing header from a bad or
/// disabled key. The digest shape is checked before any store lookup.
pub async fn api_key_auth(
    State(state): State<Arc<AppState>>,
    matched_path: Option<MatchedPath>,
    mut req: Request,
    next: Next,
) -> Response {
    let cfg = state.runtime.config();
    if !cfg.api_key_required {
        return next.run(req).await;
    }

    let path = matched_path
        .as_ref()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    if is_open_path(&path, cfg.public_config, cfg.metrics_public) {
        return next.run(req).await;
    }

    // Bootstrap window: key creation is open only while no enabled key exists.
    if req.method() == Method::POST && (path == "/keys" || path == "/api/keys") {
        if let Ok(false) = api_key_service::has_enabled_keys(&state.db) {
            return next.run(req).await;
        }
    }
    if path == "/keys/bootstrap" || path == "/api/keys/bootstrap" {
        // Guarded by X-Bootstrap-Token inside the handler instead.
        return next.run(req).await;
    }

    let key = match req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(k) if !k.trim().is_empty() => k.trim().to_string(),
        _ => return AppError::code(ErrorCode::MissingKey).into_response(),
    };

    if !is_valid_key_shape(&key) {
        return AppError::code(ErrorCode::InvalidKey).into_response();
    }

    let hash = crypto::hash_api_key(&key);
    let api_key = match api_key_service::get_by_hash(&state.db, &hash) {
        Ok(Some(k)) => k,
        Ok(None) => return AppError::code(ErrorCode::InvalidKey).into_response(),
        Err(_) => return AppError::code(ErrorCode::InvalidKey).into_response(),
    };
    if !api_key.enabled {
        return AppError::code(ErrorCode::DisabledKey).into_response();
    }

    let key_id = api_key.id;
    req.extensions_mut().insert(ApiKeyId(key_id));
    let mut response = next.run(req).await;
    response.extensions_mut().insert(ApiKeyId(key_id));

    // last_used_at is best-effort and off the request path.
    let pool = state.db.clone();
    tokio::spawn(async move {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Err(e) = api_key_service::touch_last_used(&pool, key_id, now_ms) {
            tracing::warn!(error = %e, api_key_id = key_id, "failed to touch last_used_at");
        }
    });

    response
}

fn is_open_path(path: &str, public_config: bool, metrics_public: bool) -> bool {
    match path.trim_start_matches("/api") {
        "/health" => true,
        "/config" => public_config,
        "/metrics" => metrics_public,
        _ => false,
    }
}

/// 64 lowercase hex characters, nothing else.
pub fn is_valid_key_shape(key: &str) -> bool {
    key.len() == 64
        && key
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shape_accepts_64_lowercase_hex() {
        assert!(is_valid_key_shape(&"a".repeat(64)));
        assert!(is_valid_key_shape(
            &"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"[..64]
        ));
    }

    #[test]
    fn key_shape_rejects_wrong_length_or_charset() {
        assert!(!is_valid_key_shape(""));
        assert!(!is_valid_key_shape(&"a".repeat(63)));
        assert!(!is_valid_key_shape(&"a".repeat(65)));
        assert!(!is_valid_key_shape(&"A".repeat(64)));
        let mut mixed = "a".repeat(60);
        mixed.push_str("BEEF");
        assert!(!is_valid_key_shape(&mixed));
        let mut bad = "a".repeat(63);
        bad.push('g');
        assert!(!is_valid_key_shape(&bad));
    }

    #[test]
    fn open_paths() {
        assert!(is_open_path("/health", false, false));
        assert!(is_open_path("/api/health", false, false));
        assert!(!is_open_path("/config", false, false));
        assert!(is_open_path("/config", true, false));
        assert!(is_open_path("/api/metrics", false, true));
        assert!(!is_open_path("/records", true, true));
    }
}
