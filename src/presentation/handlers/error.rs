use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{ErrorInfo, ErrorKind};

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a ErrorInfo,
}

/// API error: a structured `ErrorInfo` plus the status code it maps to.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub info: ErrorInfo,
}

impl ApiError {
    pub fn new(status: StatusCode, info: ErrorInfo) -> Self {
        Self { status, info }
    }

    /// Map an error by its kind using the service-wide status table.
    pub fn from_info(info: ErrorInfo) -> Self {
        let status = match info.kind {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::DuplicateId => StatusCode::CONFLICT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, info }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::from_info(ErrorInfo::new(ErrorKind::ValidationError, message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_info(ErrorInfo::new(ErrorKind::NotFound, message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::from_info(ErrorInfo::new(ErrorKind::InternalError, message))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ErrorInfo::new(ErrorKind::ValidationError, message),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorEnvelope { error: &self.info })).into_response()
    }
}

impl From<crate::application::ports::RepositoryError> for ApiError {
    fn from(e: crate::application::ports::RepositoryError) -> Self {
        use crate::application::ports::RepositoryError;
        match e {
            RepositoryError::NotFound(id) => Self::not_found(format!("job not found: {}", id)),
            RepositoryError::DuplicateId(id) => Self::from_info(ErrorInfo::new(
                ErrorKind::DuplicateId,
                format!("job id already exists: {}", id),
            )),
            other => {
                tracing::error!(error = %other, "Repository error");
                Self::internal("storage error")
            }
        }
    }
}
