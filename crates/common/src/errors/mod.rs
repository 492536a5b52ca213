//! Error types for RagForge services
//!
//! Provides a single error taxonomy shared by the ingestion, retrieval and
//! answering pipelines:
//! - Distinct error types for each failure mode
//! - HTTP status code mapping
//! - Structured error responses
//! - Transient/permanent classification for provider retries

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    UnsupportedMedia,
    PayloadTooLarge,

    // Source document errors (4xxx)
    SourceUnreadable,
    ParseError,

    // External provider errors (8xxx)
    ProviderError,
    ProviderTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::UnsupportedMedia => 1002,
            ErrorCode::PayloadTooLarge => 1003,

            ErrorCode::SourceUnreadable => 4001,
            ErrorCode::ParseError => 4002,

            ErrorCode::ProviderError => 8001,
            ErrorCode::ProviderTimeout => 8002,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid required setting. Raised before any network call.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Source file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Source bytes could not be decoded
    #[error("Failed to parse {source_name}: {message}")]
    Parse { source_name: String, message: String },

    /// Embedding, generation or vector store call failed
    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
    },

    /// Provider call exceeded its time bound
    #[error("Provider timeout ({provider}) after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    // Caller input errors (raised by the HTTP layer)
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Unsupported file type: {name}")]
    UnsupportedMedia { name: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Io { .. } => ErrorCode::SourceUnreadable,
            AppError::Parse { .. } => ErrorCode::ParseError,
            AppError::Provider { .. } => ErrorCode::ProviderError,
            AppError::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::UnsupportedMedia { .. } => ErrorCode::UnsupportedMedia,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 422 Unprocessable Entity
            AppError::UnsupportedMedia { .. }
            | AppError::PayloadTooLarge { .. }
            | AppError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            AppError::Io { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Provider { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Provider { retryable, .. } => *retryable,
            AppError::ProviderTimeout { .. } => true,
            _ => false,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                numeric_code: code.as_code(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::Parse {
            source_name: "report.pdf".into(),
            message: "bad xref".into(),
        };
        assert_eq!(err.code(), ErrorCode::ParseError);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_upload_rejections_are_unprocessable() {
        let too_large = AppError::PayloadTooLarge {
            size: 21 * 1024 * 1024,
            limit: 20 * 1024 * 1024,
        };
        let unsupported = AppError::UnsupportedMedia {
            name: "setup.exe".into(),
        };
        assert_eq!(too_large.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(unsupported.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::validation("question must not be empty", Some("question"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::transient("openai", "429 Too Many Requests").is_transient());
        assert!(AppError::ProviderTimeout {
            provider: "openai".into(),
            timeout_ms: 30_000
        }
        .is_transient());
        assert!(!AppError::provider("openai", "401 Unauthorized").is_transient());
        assert!(!AppError::configuration("missing key").is_transient());
    }

    #[test]
    fn test_provider_timeout_is_distinct() {
        let err = AppError::ProviderTimeout {
            provider: "pgvector".into(),
            timeout_ms: 1500,
        };
        assert_eq!(err.code(), ErrorCode::ProviderTimeout);
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code().as_code(), 8002);
    }
}
