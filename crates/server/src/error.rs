//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hopper_assembler::UploadError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Chunk indices still outstanding, for `incomplete_upload`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u32>>,
    /// Whether the same request may succeed if retried.
    pub retryable: bool,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("core error: {0}")]
    Core(#[from] hopper_core::Error),

    #[error("storage error: {0}")]
    Storage(#[from] hopper_storage::StorageError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Upload(e) => e.code(),
            Self::Core(_) => "invalid_request",
            Self::Storage(_) => "storage_failure",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upload(e) => match e {
                UploadError::UnknownSession(_) => StatusCode::NOT_FOUND,
                UploadError::InvalidIndex { .. } => StatusCode::BAD_REQUEST,
                UploadError::ChunkConflict { .. } => StatusCode::CONFLICT,
                UploadError::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::IncompleteUpload { .. } => StatusCode::BAD_REQUEST,
                UploadError::DisallowedExtension { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                UploadError::DisallowedMimeType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                UploadError::MalformedImage { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                UploadError::StorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
                UploadError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                UploadError::SessionClosed { .. } => StatusCode::CONFLICT,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Upload(e) => e.is_retryable(),
            Self::Storage(_) => true,
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let missing = match &self {
            Self::Upload(UploadError::IncompleteUpload { missing }) => Some(missing.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            missing,
            retryable: self.retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
