//! Structured API error responses with stable error codes.
//!
//! Every error body has the shape `{success: false, code, message,
//! detail?}`. Internal error text (database messages, broker errors)
//! never reaches the client; it is logged server-side and replaced
//! with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::infra::ServiceError;

/// Machine-readable error codes. Stable; clients may dispatch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRequired,
    Forbidden,
    ResourceNotFound,
    ValidationFailed,
    Conflict,
    DatabaseError,
    EventBusError,
    InternalError,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DatabaseError
            | ErrorCode::EventBusError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => {
                error!(error = %e, "Database error");
                ApiError::new(ErrorCode::DatabaseError, "A database error occurred")
            }
            ServiceError::NotFound { entity, id } => {
                ApiError::new(ErrorCode::ResourceNotFound, format!("{entity} not found"))
                    .with_detail(id)
            }
            ServiceError::Validation(msg) => ApiError::new(ErrorCode::ValidationFailed, msg),
            ServiceError::Conflict(msg) => ApiError::new(ErrorCode::Conflict, msg),
            ServiceError::Unauthorized(msg) => ApiError::new(ErrorCode::AuthRequired, msg),
            ServiceError::Forbidden(msg) => ApiError::new(ErrorCode::Forbidden, msg),
            ServiceError::Bus(e) => {
                error!(error = %e, "Event bus error");
                ApiError::new(ErrorCode::EventBusError, "Event delivery failed")
            }
            ServiceError::Internal(e) => {
                error!(error = %e, "Internal error");
                ApiError::new(ErrorCode::InternalError, "An internal error occurred")
            }
        }
    }
}
