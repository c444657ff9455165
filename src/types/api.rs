use axum::Json;
use serde::Serialize;

/// Unified response envelope.
///
/// ```json
/// {
///   "code": 200,
///   "message": "ok",
///   "data": { ... },
///   "trace_id": "1718000000000000000-7c9e...",
///   "timestamp": 1718000000123
/// }
/// ```
///
/// `code` mirrors the HTTP status; `message` is "ok" on success and the
/// typed error-code string otherwise. `data` is omitted when absent.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub trace_id: String,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(trace_id: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            code: 200,
            message: "ok".to_string(),
            data: Some(data),
            trace_id: trace_id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn error(code: u16, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            trace_id: trace_id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Page of items, the way every list endpoint shapes its `data`.
#[derive(Debug, Serialize)]
pub struct ListData<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope() {
        let Json(resp) = ApiResponse::ok("trace-1", serde_json::json!({"token": "abc"}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["code"], 200);
        assert_eq!(value["message"], "ok");
        assert_eq!(value["trace_id"], "trace-1");
        assert_eq!(value["data"]["token"], "abc");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn error_envelope_omits_data() {
        let resp = ApiResponse::<()>::error(429, "rate_limited", "");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["code"], 429);
        assert_eq!(value["message"], "rate_limited");
        assert!(value.get("data").is_none());
    }
}
