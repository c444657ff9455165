use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::middleware::TraceId;
use crate::models::{WEBHOOK_MODE_EACH_HIT, WEBHOOK_MODE_FIRST_HIT};
use crate::services::webhook_service;
use crate::types::api::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct BindWebhookRequest {
    #[validate(url)]
    pub webhook_url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct BindWebhookData {
    pub token: String,
    pub webhook_url: String,
    pub mode: String,
}

/// POST /tokens/:token/webhook
pub async fn bind_webhook(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(token): Path<String>,
    Json(mut req): Json<BindWebhookRequest>,
) -> AppResult<Json<ApiResponse<BindWebhookData>>> {
    if token.is_empty() {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }
    req.validate()?;
    if req.mode.is_empty() {
        req.mode = WEBHOOK_MODE_FIRST_HIT.to_string();
    }
    if req.mode != WEBHOOK_MODE_FIRST_HIT && req.mode != WEBHOOK_MODE_EACH_HIT {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    webhook_service::upsert_binding(
        &state.db,
        state.runtime.config(),
        &token,
        &req.webhook_url,
        &req.secret,
        &req.mode,
        now_ms,
    )?;

    Ok(ApiResponse::ok(
        trace.0,
        BindWebhookData {
            token,
            webhook_url: req.webhook_url,
            mode: req.mode,
        },
    ))
}

#[derive(Debug, Serialize)]
pub struct WebhookData {
    pub token: String,
    pub webhook_url: String,
    pub mode: String,
    pub enabled: bool,
    pub created_at: i64,
}

/// GET /tokens/:token/webhook — the secret is never echoed back.
pub async fn get_webhook(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(token): Path<String>,
) -> AppResult<Json<ApiResponse<WebhookData>>> {
    if token.is_empty() {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }
    let binding = webhook_service::get_binding(&state.db, &token)?
        .ok_or_else(|| AppError::with_trace(ErrorCode::NotFound, trace.0.clone()))?;

    Ok(ApiResponse::ok(
        trace.0,
        WebhookData {
            token: binding.token,
            webhook_url: binding.webhook_url,
            mode: binding.mode,
            enabled: binding.enabled,
            created_at: binding.created_at,
        },
    ))
}

#[derive(Debug, Serialize)]
pub struct DisableWebhookData {
    pub token: String,
    pub disabled: bool,
}

/// POST /tokens/:token/webhook/disable (also DELETE /tokens/:token/webhook)
pub async fn disable_webhook(
    State(state): State<Arc<AppState>>,
    Extension(trace): Extension<TraceId>,
    Path(token): Path<String>,
) -> AppResult<Json<ApiResponse<DisableWebhookData>>> {
    if token.is_empty() {
        return Err(AppError::with_trace(ErrorCode::BadRequest, trace.0));
    }
    webhook_service::disable_binding(&state.db, &token)?;
    Ok(ApiResponse::ok(
        trace.0,
        DisableWebhookData {
            token,
            disabled: true,
        },
    ))
}
