//! API error taxonomy and HTTP mapping.
//!
//! Every failure becomes a structured `{error, detail}` body: validation
//! problems are client errors that never reach the provider, provider
//! failures are server errors with the provider's message embedded, and an
//! uninitialized adapter is reported identically on every call until the
//! process restarts with valid configuration.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::format::MappingError;
use crate::mistral::MistralError;
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("malformed multipart request: {0}")]
    Multipart(#[from] MultipartError),
    #[error("{context}: {source}")]
    Provider {
        context: &'static str,
        source: MistralError,
    },
    #[error("failed to map provider response: {0}")]
    Mapping(#[from] MappingError),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("mistral service not initialized")]
    NotInitialized,
    #[error("failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Wrap a provider failure with the operation that hit it.
    pub fn provider(context: &'static str, source: MistralError) -> Self {
        Self::Provider { context, source }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Provider { .. }
            | Self::Mapping(_)
            | Self::NotInitialized
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Multipart(_) => "validation_error",
            Self::Provider { .. } => "provider_error",
            Self::Mapping(_) => "mapping_error",
            Self::NotFound(_) => "not_found",
            Self::NotInitialized => "not_initialized",
            Self::Io(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.category(),
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation(ValidationError::EmptyFile).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("file-abc123xyz".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::NotInitialized.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::provider("failed to list files", MistralError::MissingApiKey).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_provider_error_embeds_context_and_message() {
        let err = ApiError::provider(
            "failed to process ocr",
            MistralError::Stream("connection reset".to_string()),
        );
        let detail = err.to_string();
        assert!(detail.contains("failed to process ocr"));
        assert!(detail.contains("connection reset"));
    }
}
