//! HTTP error mapping.
//!
//! | error | status |
//! |---|---|
//! | missing identity | 401 |
//! | `Validation`, malformed request body or query | 400 |
//! | `NotAuthorized` | 403 |
//! | `NotFound` | 404 |
//! | `InvalidStateTransition` | 409 |
//! | `MalformedGenerationReply`, `Provider`, `Storage` | 500 |
//! | `GenerationTimeout` | 504 |
//!
//! 500 bodies carry a fixed message; the underlying error is only logged.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use studybuddy_core::StudyBuddyError;

/// Handler result type.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// No acting user could be established.
    Unauthenticated(String),
    /// The request could not be decoded.
    BadRequest(String),
    /// A service operation failed.
    Service(StudyBuddyError),
}

impl From<StudyBuddyError> for ApiError {
    fn from(err: StudyBuddyError) -> Self {
        ApiError::Service(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Unauthenticated(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", msg.clone())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Service(err) => {
                let status = match err {
                    StudyBuddyError::Validation(_) => StatusCode::BAD_REQUEST,
                    StudyBuddyError::NotAuthorized(_) => StatusCode::FORBIDDEN,
                    StudyBuddyError::NotFound { .. } => StatusCode::NOT_FOUND,
                    StudyBuddyError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
                    StudyBuddyError::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    StudyBuddyError::MalformedGenerationReply(_)
                    | StudyBuddyError::Provider(_)
                    | StudyBuddyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(kind = err.kind(), "request failed: {err}");
                    "content generation failed".to_string()
                } else {
                    err.to_string()
                };
                (status, err.kind(), message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));
        (status, body).into_response()
    }
}
