use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::middleware::TraceId;
use crate::models::{DnsRecord, TokenStatus, TOKEN_STATUS_EXPIRED};
use crate::services::record_service::{self, RecordFilter};
use crate::services::token_service::{self, TokenFilter};
use crate::types::api::{ApiResponse, ListData};
use crate::types::pagination::PageQuery;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AllocatedDomain {
    pub domain: String,
    pub token: String,
}

/// GET /random-domain and POST /tokens — allocate a fresh token under the
/// primary root and hand back the subdomain to resolve.
pub async fn allocate_token(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
) -> AppResult<Json<ApiResponse<AllocatedDomain>>> {
    if state.runtime.is_paused() {
        return Err(AppError::with_trace(ErrorCode::SystemPaused, trace.0));
    }

    let cfg = state.runtime.config();
    let root = cfg
        .primary_root()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("no root domain configured")))?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    let ttl_ms = cfg.token_ttl_seconds * 1000;
    let (domain, token) = token_service::allocate(&state.db, &root, now_ms, ttl_ms)?;

    tracing::info!(trace_id = %trace.0, token = %token, domain = %domain, "token allocated");

    Ok(ApiResponse::ok(trace.0, AllocatedDomain { domain, token }))
}

#[derive(Debug, Serialize)]
pub struct TokenStatusData {
    pub token: String,
    pub domain: String,
    pub status: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub hit_count: i64,
    pub expires_at: i64,
    pub expired: bool,
}

/// GET /tokens/:token
///
/// A due-but-unswept token transitions to EXPIRED visibly within this
/// call: the read triggers the single-row expiry and the reply reflects
/// it.
pub async fn get_token_status(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(token): Path<String>,
) -> AppResult<Json<ApiResponse<TokenStatusData>>> {
    if token.is_empty() {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }

    let mut status = token_service::get_status(&state.db, &token)?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    if status.status != TOKEN_STATUS_EXPIRED && status.expires_at > 0 && now_ms > status.expires_at
    {
        if token_service::maybe_expire(&state.db, &token, now_ms).is_ok() {
            status.status = TOKEN_STATUS_EXPIRED.to_string();
            status.updated_at = now_ms;
        }
    }

    let expired = status.status == TOKEN_STATUS_EXPIRED;
    Ok(ApiResponse::ok(
        trace.0,
        TokenStatusData {
            token: status.token,
            domain: status.domain,
            status: status.status,
            first_seen: status.first_seen,
            last_seen: status.last_seen,
            hit_count: status.hit_count,
            expires_at: status.expires_at,
            expired,
        },
    ))
}

#[derive(Debug, Deserialize)]
pub struct TokenListQuery {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
    pub order: Option<String>,
    #[serde(rename = "orderBy")]
    pub order_by: Option<String>,
    pub status: Option<String>,
    pub keyword: Option<String>,
    pub created_start: Option<i64>,
    pub created_end: Option<i64>,
    pub last_start: Option<i64>,
    pub last_end: Option<i64>,
}

/// GET /tokens
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Query(params): Query<TokenListQuery>,
) -> AppResult<Json<ApiResponse<ListData<TokenStatus>>>> {
    let cfg = state.runtime.config();
    let (page, size) = PageQuery {
        page: params.page,
        page_size: params.page_size,
    }
    .resolve(cfg.default_page_size, cfg.max_page_size);

    let filter = TokenFilter {
        page,
        page_size: size,
        status: params.status.filter(|s| !s.is_empty()),
        keyword: params.keyword.filter(|s| !s.is_empty()),
        created_start: params.created_start,
        created_end: params.created_end,
        last_start: params.last_start,
        last_end: params.last_end,
        order_by: params.order_by.unwrap_or_else(|| "created_at".to_string()),
        ascending: params.order.as_deref() == Some("asc"),
    };

    let (items, total) = token_service::list_tokens(&state.db, &filter)?;
    Ok(ApiResponse::ok(trace.0, ListData { items, total, page, size }))
}

#[derive(Debug, Deserialize)]
pub struct TokenRecordsQuery {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
    pub order: Option<String>,
}

/// GET /tokens/:token/records
pub async fn token_records(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(token): Path<String>,
    Query(params): Query<TokenRecordsQuery>,
) -> AppResult<Json<ApiResponse<ListData<DnsRecord>>>> {
    if token.is_empty() {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }

    let cfg = state.runtime.config();
    let (page, size) = PageQuery {
        page: params.page,
        page_size: params.page_size,
    }
    .resolve(cfg.default_page_size, cfg.max_page_size);

    let filter = RecordFilter {
        page,
        page_size: size,
        token: Some(token),
        ascending: params.order.as_deref() == Some("asc"),
        ..RecordFilter::default()
    };

    let (items, total) = record_service::list_records(&state.db, &filter)?;
    Ok(ApiResponse::ok(trace.0, ListData { items, total, page, size }))
}
