use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::types::api::ApiResponse;

/// Typed error codes surfaced by the control-plane API.
///
/// The wire form is the snake_case string from `code()`; the HTTP status
/// comes from `status_code()`. Anything a store returns that does not map
/// onto one of these collapses to `InternalError` before it reaches a
/// client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    MissingKey,
    InvalidKey,
    DisabledKey,
    NotFound,
    TokenNotFound,
    Forbidden,
    RateLimited,
    RateLimitUnavailable,
    RateLimitError,
    WebhookSecretKeyRequired,
    Conflict,
    ApiKeyAlreadyInitialized,
    SystemPaused,
    InternalError,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::MissingKey => "missing_key",
            Self::InvalidKey => "invalid_key",
            Self::DisabledKey => "disabled_key",
            Self::NotFound => "not_found",
            Self::TokenNotFound => "token_not_found",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate_limited",
            Self::RateLimitUnavailable => "rate_limit_unavailable",
            Self::RateLimitError => "rate_limit_error",
            Self::WebhookSecretKeyRequired => "webhook_secret_key_required",
            Self::Conflict => "conflict",
            Self::ApiKeyAlreadyInitialized => "api_key_already_initialized",
            Self::SystemPaused => "system_paused",
            Self::InternalError => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::WebhookSecretKeyRequired => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::MissingKey | Self::InvalidKey | Self::DisabledKey => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound | Self::TokenNotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::RateLimitUnavailable | Self::RateLimitError | Self::SystemPaused => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Conflict | Self::ApiKeyAlreadyInitialized => StatusCode::CONFLICT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{}", .code.code())]
    Known { code: ErrorCode, trace_id: String },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn code(code: ErrorCode) -> Self {
        Self::Known {
            code,
            trace_id: String::new(),
        }
    }

    pub fn with_trace(code: ErrorCode, trace_id: impl Into<String>) -> Self {
        Self::Known {
            code,
            trace_id: trace_id.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::code(ErrorCode::NotFound)
    }

    pub fn forbidden() -> Self {
        Self::code(ErrorCode::Forbidden)
    }

    pub fn internal() -> Self {
        Self::code(ErrorCode::InternalError)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, trace_id) = match self {
            AppError::Known { code, trace_id } => (code, trace_id),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (ErrorCode::InternalError, String::new())
            }
            AppError::Database(err) => match err {
                diesel::result::Error::NotFound => (ErrorCode::NotFound, String::new()),
                other => {
                    tracing::error!(error = %other, "database error");
                    (ErrorCode::InternalError, String::new())
                }
            },
            AppError::Validation(msg) => {
                tracing::warn!(error = %msg, "request validation failed");
                (ErrorCode::BadRequest, String::new())
            }
        };

        let status = code.status_code();
        let body = ApiResponse::<()>::error(status.as_u16(), code.code(), trace_id);
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn code_strings() {
        assert_eq!(ErrorCode::MissingKey.code(), "missing_key");
        assert_eq!(ErrorCode::RateLimitUnavailable.code(), "rate_limit_unavailable");
        assert_eq!(
            ErrorCode::ApiKeyAlreadyInitialized.code(),
            "api_key_already_initialized"
        );
        assert_eq!(
            ErrorCode::WebhookSecretKeyRequired.code(),
            "webhook_secret_key_required"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::MissingKey.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ErrorCode::RateLimitUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::SystemPaused.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TokenNotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn envelope_shape() {
        let value = body_json(AppError::code(ErrorCode::TokenNotFound)).await;
        assert_eq!(value["code"], 404);
        assert_eq!(value["message"], "token_not_found");
        assert_eq!(value["trace_id"], "");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
        assert!(value.get("data").is_none());
    }

    #[tokio::test]
    async fn db_not_found_maps_to_404() {
        let response = AppError::Database(diesel::result::Error::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn raw_db_error_collapses_to_internal() {
        let err = AppError::Database(diesel::result::Error::BrokenTransactionManager);
        let value = body_json(err).await;
        assert_eq!(value["code"], 500);
        assert_eq!(value["message"], "internal_error");
    }
}
