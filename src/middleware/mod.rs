mod audit;
mod auth;
mod blacklist;
mod metrics_layer;
mod rate_limit;
mod trace;
mod tracing_layer;

pub use audit::*;
pub use auth::*;
pub use blacklist::*;
pub use metrics_layer::*;
pub use rate_limit::*;
pub use trace::*;
pub use tracing_layer::*;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::Request;
use std::net::SocketAddr;

/// Request-scoped trace id, set by the trace layer and read by handlers
/// and the audit layer.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

/// Authenticated key id, set by the auth layer on both the request (for
/// handlers) and the response (for the audit layer).
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyId(pub i64);

/// Client address in printable form: the first `X-Forwarded-For` hop when
/// present, else the socket peer.
pub fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_default()
}
