use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::middleware::TraceId;
use crate::models::BlacklistEntry;
use crate::services::blacklist_service;
use crate::types::api::{ApiResponse, ListData};
use crate::types::pagination::PageQuery;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddBlacklistRequest {
    pub ip: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct AddBlacklistData {
    pub ip: String,
    pub enabled: bool,
}

/// POST /blacklist
pub async fn add_blacklist(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Json(req): Json<AddBlacklistRequest>,
) -> AppResult<Json<ApiResponse<AddBlacklistData>>> {
    if req.ip.parse::<IpAddr>().is_err() {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    blacklist_service::add(&state.db, state.redis.as_ref(), &req.ip, &req.reason, now_ms).await?;

    tracing::info!(trace_id = %trace.0, ip = %req.ip, "ip blacklisted");

    Ok(ApiResponse::ok(
        trace.0,
        AddBlacklistData {
            ip: req.ip,
            enabled: true,
        },
    ))
}

/// GET /blacklist
pub async fn list_blacklist(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Query(params): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<ListData<BlacklistEntry>>>> {
    let cfg = state.runtime.config();
    let (page, size) = params.resolve(cfg.default_page_size, cfg.max_page_size);

    let (items, total) = blacklist_service::list(&state.db, page, size)?;
    Ok(ApiResponse::ok(trace.0, ListData { items, total, page, size }))
}

#[derive(Debug, Serialize)]
pub struct DisabledBlacklistData {
    pub id: i64,
    pub disabled: bool,
}

/// POST /blacklist/:id/disable (also DELETE /blacklist/:id)
pub async fn disable_blacklist(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<DisabledBlacklistData>>> {
    if id <= 0 {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }
    blacklist_service::disable(&state.db, state.redis.as_ref(), id).await?;
    Ok(ApiResponse::ok(trace.0, DisabledBlacklistData { id, disabled: true }))
}
