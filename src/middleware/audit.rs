use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::{client_ip, ApiKeyId, TraceId};
use crate::models::AuditEntry;
use crate::services::audit_service;
use crate::AppState;

/// Wraps the rest of the admission stack so the audit entry carries the
/// final status and latency. Entries go through the redis queue; the
/// drain worker lands them in the table.
pub async fn audit_middleware(
    State(state): State<Arc<AppState>>,
    matched_path: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    if !state.runtime.config().audit_enabled {
        return next.run(req).await;
    }

    let start = Instant::now();
    let method = req.method().to_string();
    let path = matched_path
        .as_ref()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();
    let ip = client_ip(&req);
    let token = token_param(
        matched_path.as_ref().map(|p| p.as_str()),
        req.uri().path(),
    )
    .or_else(|| query_param(req.uri().query(), "token"))
    .unwrap_or_default();

    let response = next.run(req).await;

    let entry = AuditEntry {
        trace_id,
        api_key_id: response.extensions().get::<ApiKeyId>().map(|k| k.0),
        path,
        method,
        client_ip: ip,
        status_code: response.status().as_u16() as i32,
        latency_ms: start.elapsed().as_millis() as i64,
        token,
        created_at: chrono::Utc::now().timestamp_millis(),
    };

    audit_service::enqueue(&state.db, state.redis.as_ref(), entry).await;

    response
}

/// Extract the `:token` path parameter by aligning the matched template
/// with the concrete path.
fn token_param(matched: Option<&str>, path: &str) -> Option<String> {
    let template = matched?;
    let mut concrete = path.split('/');
    for segment in template.split('/') {
        let value = concrete.next()?;
        if segment == ":token" {
            if value.is_empty() {
                return None;
            }
            return Some(value.to_string());
        }
    }
    None
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let Some((k, v)) = pair.split_once('=') else {
            continue;
        };
        if k == name && !v.is_empty() {
            return Some(v.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_param_from_path() {
        assert_eq!(
            token_param(Some("/tokens/:token/records"), "/tokens/abc1234567/records"),
            Some("abc1234567".to_string())
        );
        assert_eq!(
            token_param(Some("/api/tokens/:token"), "/api/tokens/deadbeef00"),
            Some("deadbeef00".to_string())
        );
        assert_eq!(token_param(Some("/records"), "/records"), None);
        assert_eq!(token_param(None, "/tokens/abc"), None);
    }

    #[test]
    fn token_param_from_query() {
        assert_eq!(
            query_param(Some("page=1&token=abc1234567"), "token"),
            Some("abc1234567".to_string())
        );
        assert_eq!(query_param(Some("page=1"), "token"), None);
        assert_eq!(query_param(None, "token"), None);
    }
}
