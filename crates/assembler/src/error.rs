//! Upload error taxonomy.

use hopper_core::{UploadState, Violation};
use hopper_storage::StorageError;
use thiserror::Error;

/// Errors returned by [`UploadAssembler`](crate::UploadAssembler) operations.
///
/// Every failure has a specific kind so callers can tell user-correctable
/// input errors from infrastructure errors.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unknown upload session: {0}")]
    UnknownSession(String),

    #[error("chunk index {index} out of range (expected {expected} chunks)")]
    InvalidIndex { index: u32, expected: u32 },

    #[error("chunk {index} already received with different content")]
    ChunkConflict { index: u32 },

    #[error("upload size {size} exceeds maximum {max}")]
    SizeExceeded { size: u64, max: u64 },

    #[error("upload incomplete: {} chunk(s) missing", missing.len())]
    IncompleteUpload { missing: Vec<u32> },

    #[error("file extension not allowed: {extension:?}")]
    DisallowedExtension { extension: String },

    #[error("content type not allowed: {mime}")]
    DisallowedMimeType { mime: String },

    #[error("malformed image: {reason}")]
    MalformedImage { reason: String },

    #[error("storage failure: {0}")]
    StorageFailure(#[from] StorageError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session is {state}")]
    SessionClosed { state: UploadState },
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;

impl UploadError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::UnknownSession(_) => "unknown_session",
            UploadError::InvalidIndex { .. } => "invalid_index",
            UploadError::ChunkConflict { .. } => "chunk_conflict",
            UploadError::SizeExceeded { .. } => "size_exceeded",
            UploadError::IncompleteUpload { .. } => "incomplete_upload",
            UploadError::DisallowedExtension { .. } => "disallowed_extension",
            UploadError::DisallowedMimeType { .. } => "disallowed_mime_type",
            UploadError::MalformedImage { .. } => "malformed_image",
            UploadError::StorageFailure(_) => "storage_failure",
            UploadError::InvalidRequest(_) => "invalid_request",
            UploadError::SessionClosed { .. } => "session_closed",
        }
    }

    /// Validation failures end the session; the caller must start a new one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadError::SizeExceeded { .. }
                | UploadError::DisallowedExtension { .. }
                | UploadError::DisallowedMimeType { .. }
                | UploadError::MalformedImage { .. }
        )
    }

    /// Infrastructure failures the caller may retry against the same session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::StorageFailure(_))
    }

    pub(crate) fn unknown(id: &hopper_core::SessionId) -> Self {
        UploadError::UnknownSession(id.to_string())
    }
}

impl From<Violation> for UploadError {
    fn from(violation: Violation) -> Self {
        match violation {
            Violation::SizeExceeded { size, max } => UploadError::SizeExceeded { size, max },
            Violation::DisallowedExtension { extension } => {
                UploadError::DisallowedExtension { extension }
            }
            Violation::DisallowedMimeType { mime } => UploadError::DisallowedMimeType { mime },
            Violation::MalformedImage { reason } => UploadError::MalformedImage { reason },
        }
    }
}

impl From<hopper_core::Error> for UploadError {
    fn from(err: hopper_core::Error) -> Self {
        UploadError::InvalidRequest(err.to_string())
    }
}
