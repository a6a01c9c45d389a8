//! API error types and JSON error response formatting.
//!
//! Every handler returns `Result<_, ApiError>`, so clients always see the
//! same `{error, message}` body whatever went wrong.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use asis_chat::ChatError;
use asis_core::error::AsisError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable code: `bad_request`, `not_found` or `internal_error`.
    pub error: String,
    /// Message for the client, Romanian when it comes from an action.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error returned by every handler; rendered as an [`ErrorBody`].
#[derive(Debug)]
pub enum ApiError {
    /// 400: the request or the action data was rejected.
    BadRequest(String),
    /// 404: no such record, intent or route.
    NotFound(String),
    /// 500 Internal Server Error. The message is logged, never returned.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AsisError> for ApiError {
    fn from(err: AsisError) -> Self {
        match err {
            AsisError::NotFound(msg) => ApiError::NotFound(msg),
            AsisError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match &err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::ConversationNotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[tokio::test]
    async fn test_internal_error_sanitized() {
        let resp = ApiError::Internal("sqlite: disk full at /var/db".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body_text(resp).await;
        assert!(!text.contains("/var/db"));
        assert!(text.contains("An internal error occurred"));
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let resp = ApiError::NotFound("task not found".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "task not found");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_storage_errors_map_to_status() {
        let not_found: ApiError = AsisError::NotFound("x".to_string()).into();
        assert!(matches!(not_found, ApiError::NotFound(_)));
        let invalid: ApiError = AsisError::Validation("x".to_string()).into();
        assert!(matches!(invalid, ApiError::BadRequest(_)));
        let storage: ApiError = AsisError::Storage("x".to_string()).into();
        assert!(matches!(storage, ApiError::Internal(_)));
    }

    #[test]
    fn test_chat_errors_map_to_status() {
        assert!(matches!(ApiError::from(ChatError::EmptyMessage), ApiError::BadRequest(_)));
        assert!(matches!(
            ApiError::from(ChatError::ConversationNotFound(uuid::Uuid::new_v4())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(ChatError::Timeout(30)),
            ApiError::Internal(_)
        ));
    }
}
