use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::middleware::TraceId;
use crate::types::api::ApiResponse;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigData {
    pub root_domain: String,
    pub root_domains: Vec<String>,
    pub capture_all: bool,
    pub dns_listen_addr: String,
    pub http_listen: String,
    pub upstream_dns: Vec<String>,
    pub current_upstream: String,
    pub protocol: String,
    pub page_size: i64,
    pub max_page_size: i64,
}

/// GET /config — the non-sensitive runtime view.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
) -> Json<ApiResponse<ConfigData>> {
    let cfg = state.runtime.config();
    ApiResponse::ok(
        trace.0,
        ConfigData {
            root_domain: cfg.root_domain.clone(),
            root_domains: state.roots.clone(),
            capture_all: cfg.capture_all,
            dns_listen_addr: cfg.dns_listen_addr.clone(),
            http_listen: cfg.http_listen_addr.clone(),
            upstream_dns: cfg.upstream_dns.clone(),
            current_upstream: state.runtime.current_upstream(),
            protocol: state.runtime.protocol(),
            page_size: cfg.default_page_size,
            max_page_size: cfg.max_page_size,
        },
    )
}

/// GET /metrics — Prometheus exposition text.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> AppResult<String> {
    let Some(handle) = state.metrics.as_ref() else {
        return Err(AppError::not_found());
    };
    Ok(handle.render())
}

#[derive(Debug, Serialize)]
pub struct MessageData {
    pub message: String,
}

/// POST /pause
pub async fn pause(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
) -> Json<ApiResponse<MessageData>> {
    state.runtime.set_paused(true);
    tracing::info!(trace_id = %trace.0, "system paused");
    ApiResponse::ok(
        trace.0,
        MessageData {
            message: "system paused".to_string(),
        },
    )
}

/// POST /start
pub async fn start(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
) -> Json<ApiResponse<MessageData>> {
    state.runtime.set_paused(false);
    tracing::info!(trace_id = %trace.0, "system started");
    ApiResponse::ok(
        trace.0,
        MessageData {
            message: "system started".to_string(),
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct ChangeUpstreamRequest {
    pub num: i64,
}

/// POST /change — switch the active upstream resolver by list index.
pub async fn change_upstream(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Json(req): Json<ChangeUpstreamRequest>,
) -> AppResult<Json<ApiResponse<MessageData>>> {
    let idx = usize::try_from(req.num)
        .map_err(|_| AppError::with_trace(ErrorCode::BadRequest, trace.0.clone()))?;
    if !state.runtime.set_upstream_index(idx) {
        tracing::warn!(trace_id = %trace.0, num = req.num, "upstream index out of range");
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }

    let upstream = state.runtime.current_upstream();
    tracing::info!(trace_id = %trace.0, upstream = %upstream, "upstream dns changed");
    Ok(ApiResponse::ok(
        trace.0,
        MessageData {
            message: format!("upstream dns changed to {upstream}"),
        },
    ))
}

#[derive(Debug, Deserialize)]
pub struct ChangeProtocolRequest {
    pub pact: String,
}

/// POST /change-pact — switch the default query protocol.
pub async fn change_protocol(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Json(req): Json<ChangeProtocolRequest>,
) -> AppResult<Json<ApiResponse<MessageData>>> {
    if !state.runtime.set_protocol(&req.pact) {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }
    tracing::info!(trace_id = %trace.0, protocol = %req.pact, "default protocol changed");
    Ok(ApiResponse::ok(
        trace.0,
        MessageData {
            message: format!("protocol changed to {}", req.pact),
        },
    ))
}
