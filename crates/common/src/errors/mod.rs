//! Error types for FinChat services
//!
//! Provides a single error enum for the whole answering pipeline with:
//! - Distinct variants for retrieval, generation and collaborator failures
//! - Machine-readable error codes for logs and metrics
//! - Retry classification used by the resilience layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Upstream dependency errors (8xxx)
    EmbeddingError,
    IndexError,
    Timeout,
    UpstreamError,

    // Pipeline errors (85xx)
    RetrievalError,
    GenerationError,

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

            ErrorCode::EmbeddingError => 8002,
            ErrorCode::IndexError => 8003,
            ErrorCode::Timeout => 8004,
            ErrorCode::UpstreamError => 8005,

            ErrorCode::RetrievalError => 8501,
            ErrorCode::GenerationError => 8502,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }

    /// Stable label used in metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::EmbeddingError => "embedding_error",
            ErrorCode::IndexError => "index_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::UpstreamError => "upstream_error",
            ErrorCode::RetrievalError => "retrieval_error",
            ErrorCode::GenerationError => "generation_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ConfigurationError => "configuration_error",
            ErrorCode::SerializationError => "serialization_error",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Embedding provider failure. `retryable` is false for 4xx responses.
    #[error("Embedding service error: {message}")]
    Embedding { message: String, retryable: bool },

    #[error("Passage index error: {message}")]
    Index { message: String, retryable: bool },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Every query variant failed against the passage index
    #[error("Retrieval failed: {message}")]
    Retrieval { message: String },

    /// The chat model failed, timed out, or answered with something unusable
    #[error("Generation failed: {message}")]
    Generation { message: String, retryable: bool },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a non-retryable generation failure
    pub fn generation(message: impl Into<String>) -> Self {
        AppError::Generation {
            message: message.into(),
            retryable: false,
        }
    }

    /// Shorthand for a validation failure on a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Embedding { .. } => ErrorCode::EmbeddingError,
            AppError::Index { .. } => ErrorCode::IndexError,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::Retrieval { .. } => ErrorCode::RetrievalError,
            AppError::Generation { .. } => ErrorCode::GenerationError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether another attempt of the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Timeout { .. } => true,
            AppError::Embedding { retryable, .. }
            | AppError::Index { retryable, .. }
            | AppError::Generation { retryable, .. } => *retryable,
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }
}

/// Classify an HTTP status from an upstream API: 5xx and 429 are worth retrying
pub fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
