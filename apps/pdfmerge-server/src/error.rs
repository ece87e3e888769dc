//! Error types for the merge pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::convert::ConversionFailure;
use crate::models::SourceKind;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported file type")]
    UnsupportedType,

    #[error("Failed to convert {kind}: {cause}")]
    ConversionError {
        kind: SourceKind,
        #[source]
        cause: ConversionFailure,
    },

    #[error("No files to merge")]
    NoFiles,

    #[error("File not found: {0}")]
    MissingFile(String),

    #[error("Merge failed: {0}")]
    MergeError(String),

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Not found")]
    NotFound,

    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::InvalidRequest(_)
            | PipelineError::UnsupportedType
            | PipelineError::NoFiles => StatusCode::BAD_REQUEST,
            PipelineError::MissingFile(_) | PipelineError::NotFound => StatusCode::NOT_FOUND,
            PipelineError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::ConversionError { .. }
            | PipelineError::MergeError(_)
            | PipelineError::EncryptionError(_)
            | PipelineError::Io(_)
            | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
            PipelineError::UnsupportedType => "UNSUPPORTED_TYPE",
            PipelineError::ConversionError { .. } => "CONVERSION_ERROR",
            PipelineError::NoFiles => "NO_FILES",
            PipelineError::MissingFile(_) => "MISSING_FILE",
            PipelineError::MergeError(_) => "MERGE_ERROR",
            PipelineError::EncryptionError(_) => "ENCRYPTION_ERROR",
            PipelineError::NotFound => "NOT_FOUND",
            PipelineError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            PipelineError::Io(_) | PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client: internal causes and paths stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::InvalidRequest(msg) => msg.clone(),
            PipelineError::UnsupportedType => {
                "File type not allowed. Use PDF, DOCX, JPG, or PNG.".to_string()
            }
            PipelineError::ConversionError { kind, .. } => match kind {
                SourceKind::WordDocument => "Failed to convert Word file".to_string(),
                SourceKind::Image => "Failed to convert image".to_string(),
                SourceKind::Pdf => "Failed to store PDF".to_string(),
            },
            PipelineError::NoFiles => "No files to merge".to_string(),
            PipelineError::MissingFile(id) => format!("File not found: {}", id),
            PipelineError::MergeError(_) => "Failed to merge PDFs".to_string(),
            PipelineError::EncryptionError(_) => "Failed to password-protect PDF".to_string(),
            PipelineError::NotFound => "No merged file found".to_string(),
            PipelineError::PayloadTooLarge(limit) => {
                format!("File too large. Maximum size is {} MB.", limit / (1024 * 1024))
            }
            PipelineError::Io(_) | PipelineError::Internal(_) => "Internal error".to_string(),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::debug!(code = self.code(), "{}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.public_message(),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::RenderError;

    #[test]
    fn test_caller_mistakes_are_400() {
        assert_eq!(PipelineError::UnsupportedType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(PipelineError::NoFiles.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_artifacts_are_404() {
        assert_eq!(
            PipelineError::MissingFile("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(PipelineError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_failures_are_500_and_hide_causes() {
        let err = PipelineError::ConversionError {
            kind: SourceKind::WordDocument,
            cause: ConversionFailure::Render(RenderError::Failed(
                "soffice crashed in /srv/uploads/abc".into(),
            )),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("/srv"));

        let err = PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "/srv/uploads/abc: disk full",
        ));
        assert_eq!(err.public_message(), "Internal error");
    }

    #[test]
    fn test_payload_too_large_reports_megabytes() {
        let err = PipelineError::PayloadTooLarge(50 * 1024 * 1024);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.public_message().contains("50 MB"));
    }
}
