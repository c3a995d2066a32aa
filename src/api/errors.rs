//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::errors::{StateError, WagerError};

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, VALIDATION_ERROR, STATE_CONFLICT, etc.)
    pub code: String,
    /// Short message safe to show to the player
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unprocessable(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn new(kind: ApiErrorKind, request_id: String) -> Self {
        Self { kind, request_id, details: None }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::NotFound(message), request_id)
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::BadRequest(message), request_id)
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self::new(ApiErrorKind::InternalError(message), request_id)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Map an engine error onto its HTTP class. The message is always the
    /// user-facing text, never the internal error string.
    pub fn from_wager(request_id: String, err: WagerError) -> Self {
        let message = err.user_message();
        match err {
            WagerError::Validation(e) => Self::new(ApiErrorKind::BadRequest(message), request_id)
                .with_details(json!({ "reason": e.to_string() })),
            WagerError::State(e) => {
                let not_found = matches!(
                    e,
                    StateError::EntryNotFound(_)
                        | StateError::AdjustmentNotFound(_)
                        | StateError::AccountNotFound(_)
                        | StateError::PromoNotFound(_)
                );
                let kind = if not_found {
                    ApiErrorKind::NotFound(message)
                } else {
                    ApiErrorKind::Conflict(message)
                };
                let api = Self::new(kind, request_id);
                match e {
                    StateError::JustCrashed { crash_point } => api.with_details(json!({ "crash_point": crash_point })),
                    StateError::CooldownActive { remaining_secs } => {
                        api.with_details(json!({ "remaining_secs": remaining_secs }))
                    }
                    _ => api,
                }
            }
            WagerError::Consistency(e) => {
                tracing::error!(request_id = %request_id, error = %e, "request failed closed");
                Self::new(ApiErrorKind::Unprocessable(message), request_id)
            }
            WagerError::Storage(e) => {
                tracing::error!(request_id = %request_id, error = %e, "ledger store unavailable");
                Self::new(ApiErrorKind::ServiceUnavailable(message), request_id)
            }
            WagerError::Configuration(e) => {
                tracing::error!(request_id = %request_id, error = %e, "configuration error");
                Self::new(ApiErrorKind::InternalError(message), request_id)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ApiErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            ApiErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Conflict(_) => StatusCode::CONFLICT,
            ApiErrorKind::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiErrorKind::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorKind::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code_and_message(&self) -> (&'static str, &str) {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => ("NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => ("VALIDATION_ERROR", msg),
            ApiErrorKind::Conflict(msg) => ("STATE_CONFLICT", msg),
            ApiErrorKind::Unprocessable(msg) => ("CONSISTENCY_ERROR", msg),
            ApiErrorKind::InternalError(msg) => ("INTERNAL_ERROR", msg),
            ApiErrorKind::ServiceUnavailable(msg) => ("SERVICE_UNAVAILABLE", msg),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (code, message) = self.code_and_message();
        write!(f, "[{}] {}: {}", self.request_id, code, message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = self.code_and_message();

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                details: self.details.clone(),
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConsistencyError, StorageError, ValidationError};

    #[test]
    fn categories_map_to_status_codes() {
        let cases: Vec<(WagerError, StatusCode)> = vec![
            (ValidationError::NonPositiveStake(0).into(), StatusCode::BAD_REQUEST),
            (StateError::NothingToCollect.into(), StatusCode::CONFLICT),
            (StateError::EntryNotFound(3).into(), StatusCode::NOT_FOUND),
            (ConsistencyError::NoInverse("delete_user".into()).into(), StatusCode::UNPROCESSABLE_ENTITY),
            (StorageError::Unavailable("down".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from_wager("req".into(), err).status(), status);
        }
    }

    #[test]
    fn late_cash_out_carries_crash_point() {
        let api = ApiError::from_wager("req".into(), StateError::JustCrashed { crash_point: 1.9 }.into());
        assert_eq!(api.details, Some(json!({ "crash_point": 1.9 })));
        assert_eq!(api.code_and_message().1, "Too late! It crashed at 1.90x");
    }
}
