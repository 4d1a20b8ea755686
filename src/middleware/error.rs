//! Error response formatting
//!
//! Every failed request answers with the same JSON shape:
//! `{"error": <message>, "code": <MACHINE_CODE>, "details"?, "request_id"?}`.

use crate::error::{AppError, AppErrorKind, DomainError, ErrorCode};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.user_message(),
            code: error.error_code(),
            details: details_for(error),
            request_id: error.request_id.clone(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn details_for(error: &AppError) -> Option<serde_json::Value> {
    match &error.kind {
        AppErrorKind::Domain(DomainError::InsufficientFunds {
            available_cents,
            required_cents,
        }) => Some(serde_json::json!({
            "available_cents": available_cents,
            "required_cents": required_cents,
        })),
        AppErrorKind::Domain(DomainError::InvalidState {
            current, attempted, ..
        }) => Some(serde_json::json!({
            "current_status": current,
            "attempted": attempted,
        })),
        _ => None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = %self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = %self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_from_app_error() {
        let app_error = AppError::insufficient_funds(100, 500).with_request_id("req_123");

        let error_response = ErrorResponse::from_app_error(&app_error);

        assert_eq!(error_response.code, ErrorCode::InsufficientFunds);
        assert_eq!(error_response.request_id, Some("req_123".to_string()));
        assert_eq!(
            error_response.details.unwrap()["required_cents"],
            serde_json::json!(500)
        );
    }

    #[test]
    fn test_app_error_into_response() {
        let response = AppError::not_found("application", "abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::forbidden("not a member").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ErrorResponse::from_app_error(
            &AppError::missing_field("amount"),
        ))
        .unwrap();

        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().unwrap().contains("amount"));
        assert!(body.get("request_id").is_none());
    }
}
