use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use super::TraceId;

pub fn generate_trace_id() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{nanos}-{}", Uuid::new_v4())
}

/// Tag every request with a trace id and echo it back as `X-Trace-ID`.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("X-Trace-ID", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_shape() {
        let id = generate_trace_id();
        let (nanos, uuid) = id.split_once('-').unwrap();
        assert!(nanos.parse::<i64>().unwrap() > 0);
        // remainder is a uuid (itself hyphenated)
        assert_eq!(uuid.len(), 36);
    }

    #[test]
    fn trace_ids_are_unique() {
        assert_ne!(generate_trace_id(), generate_trace_id());
    }
}
