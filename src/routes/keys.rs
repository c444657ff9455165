use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::crypto;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::middleware::{ApiKeyId, TraceId};
use crate::services::api_key_service;
use crate::types::api::{ApiResponse, ListData};
use crate::types::pagination::PageQuery;
use crate::AppState;

const BOOTSTRAP_TOKEN_HEADER: &str = "X-Bootstrap-Token";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateKeyRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[serde(default)]
    pub comment: String,
}

/// The plaintext key appears here exactly once; only its digest persists.
#[derive(Debug, Serialize)]
pub struct CreatedKeyData {
    pub id: i64,
    pub name: String,
    pub key: String,
}

/// POST /keys
///
/// With enforcement on and no key on the request, this is the bootstrap
/// branch: creation races are settled in the store so exactly one caller
/// wins and the rest see `api_key_already_initialized`.
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    caller: Option<Extension<ApiKeyId>>,
    Json(req): Json<CreateKeyRequest>,
) -> AppResult<Json<ApiResponse<CreatedKeyData>>> {
    req.validate()?;

    let (plain, hash) = crypto::generate_api_key();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let cfg = state.runtime.config();

    let id = if cfg.api_key_required && caller.is_none() {
        api_key_service::create_bootstrap(&state.db, &req.name, &hash, &req.comment, now_ms)?
    } else {
        api_key_service::create(&state.db, &req.name, &hash, &req.comment, now_ms)?
    };

    tracing::info!(trace_id = %trace.0, api_key_id = id, name = %req.name, "api key created");

    Ok(ApiResponse::ok(
        trace.0,
        CreatedKeyData {
            id,
            name: req.name,
            key: plain,
        },
    ))
}

/// POST /keys/bootstrap — recovery path guarded by the configured
/// bootstrap token rather than an existing key.
pub async fn create_key_bootstrap(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    headers: HeaderMap,
    Json(req): Json<CreateKeyRequest>,
) -> AppResult<Json<ApiResponse<CreatedKeyData>>> {
    let cfg = state.runtime.config();
    if !cfg.bootstrap_enabled {
        return Err(AppError::with_trace(ErrorCode::Forbidden, trace.0));
    }
    let presented = headers
        .get(BOOTSTRAP_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() || cfg.bootstrap_token.is_empty() || presented != cfg.bootstrap_token {
        return Err(AppError::with_trace(ErrorCode::Unauthorized, trace.0));
    }
    req.validate()?;

    let (plain, hash) = crypto::generate_api_key();
    let now_ms = chrono::Utc::now().timestamp_millis();
    let id = api_key_service::create(&state.db, &req.name, &hash, &req.comment, now_ms)?;

    tracing::warn!(trace_id = %trace.0, api_key_id = id, "api key created via bootstrap token");

    Ok(ApiResponse::ok(
        trace.0,
        CreatedKeyData {
            id,
            name: req.name,
            key: plain,
        },
    ))
}

/// Listed view: the digest itself stays private, only a short prefix is
/// shown for correlation.
#[derive(Debug, Serialize)]
pub struct KeyListItem {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub created_at: i64,
    pub last_used_at: i64,
    pub comment: String,
    pub hash_prefix: String,
}

/// GET /keys
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Query(params): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<ListData<KeyListItem>>>> {
    let cfg = state.runtime.config();
    let (page, size) = params.resolve(cfg.default_page_size, cfg.max_page_size);

    let (keys, total) = api_key_service::list(&state.db, page, size)?;
    let items = keys
        .into_iter()
        .map(|k| KeyListItem {
            id: k.id,
            name: k.name,
            enabled: k.enabled,
            created_at: k.created_at,
            last_used_at: k.last_used_at,
            comment: k.comment,
            hash_prefix: k.api_key.chars().take(6).collect(),
        })
        .collect();

    Ok(ApiResponse::ok(trace.0, ListData { items, total, page, size }))
}

#[derive(Debug, Serialize)]
pub struct DisabledKeyData {
    pub id: i64,
    pub disabled: bool,
}

/// POST /keys/:id/disable (also DELETE /keys/:id)
pub async fn disable_key(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DisabledKeyData>>> {
    if id <= 0 {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }
    api_key_service::set_enabled(&state.db, id, false)?;
    Ok(ApiResponse::ok(trace.0, DisabledKeyData { id, disabled: true }))
}
