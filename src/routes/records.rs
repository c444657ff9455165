use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::dns::{is_valid_domain, normalize_domain, select_matched_root};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::middleware::TraceId;
use crate::models::DnsRecord;
use crate::services::record_service::{self, RecordFilter};
use crate::types::api::{ApiResponse, ListData};
use crate::types::pagination::PageQuery;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordListQuery {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
    pub order: Option<String>,
    pub cursor: Option<i64>,
    pub domain: Option<String>,
    pub client_ip: Option<String>,
    pub protocol: Option<String>,
    pub qtype: Option<String>,
    pub token: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

/// GET /records
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Query(params): Query<RecordListQuery>,
) -> AppResult<Json<ApiResponse<ListData<DnsRecord>>>> {
    let cfg = state.runtime.config();
    let (page, size) = PageQuery {
        page: params.page,
        page_size: params.page_size,
    }
    .resolve(cfg.default_page_size, cfg.max_page_size);

    let filter = RecordFilter {
        page,
        page_size: size,
        domain: params.domain,
        client_ip: params.client_ip,
        protocol: params.protocol,
        qtype: params.qtype,
        token: params.token,
        start: params.start,
        end: params.end,
        cursor: params.cursor,
        ascending: params.order.as_deref() == Some("asc"),
    };

    let (items, total) = record_service::list_records(&state.db, &filter)?;
    Ok(ApiResponse::ok(trace.0, ListData { items, total, page, size }))
}

#[derive(Debug, Deserialize)]
pub struct SubmitDomainRequest {
    pub domain_name: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitDomainData {
    pub domain: String,
    pub items: Vec<DnsRecord>,
    pub total: i64,
    pub pending: bool,
    pub timestamp: i64,
}

/// POST /submit — look up the capture history for a domain the caller is
/// waiting on (the web flow's polling endpoint).
pub async fn submit_domain(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Json(req): Json<SubmitDomainRequest>,
) -> AppResult<Json<ApiResponse<SubmitDomainData>>> {
    if state.runtime.is_paused() {
        return Err(AppError::with_trace(ErrorCode::SystemPaused, trace.0));
    }
    if req.domain_name.is_empty() {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }

    let domain = normalize_domain(&req.domain_name);
    if !is_valid_domain(&domain) {
        tracing::info!(trace_id = %trace.0, domain = %domain, "rejected malformed domain");
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }

    let cfg = state.runtime.config();
    if !cfg.capture_all && select_matched_root(&domain, &state.roots).is_none() {
        tracing::warn!(trace_id = %trace.0, domain = %domain, "domain outside monitored roots");
        return Err(AppError::with_trace(ErrorCode::Forbidden, trace.0));
    }

    let filter = RecordFilter {
        page: 1,
        page_size: cfg.max_page_size,
        domain: Some(domain.clone()),
        ..RecordFilter::default()
    };
    let (items, total) = record_service::list_records(&state.db, &filter)?;

    tracing::info!(trace_id = %trace.0, domain = %domain, record_total = total, "domain lookup served");

    Ok(ApiResponse::ok(
        trace.0,
        SubmitDomainData {
            domain,
            pending: total == 0,
            items,
            total,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    ))
}
