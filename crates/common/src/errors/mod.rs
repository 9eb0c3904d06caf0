//! Error types for Tuneboard
//!
//! Provides a single error enum shared by every crate with:
//! - Distinct variants for each failure mode of the external services
//! - A coarse [`ErrorKind`] classification (transport / backend / validation)
//! - Numeric error codes attached to every failure log line

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// How a failure should be surfaced.
///
/// Transport failures degrade silently into "status unknown", backend
/// failures are shown verbatim, validation failures never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Backend,
    Validation,
    Internal,
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    NoDataset,
    ModelNotTrained,
    EmptyQuestion,

    // Authentication errors (2xxx)
    Unauthorized,
    RateLimited,

    // Resource errors (4xxx)
    NotFound,

    // Backend-reported errors (8xxx)
    BackendError,
    InvalidResponse,
    StoreError,

    // Transport errors (85xx)
    TransportError,
    UnexpectedStatus,

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
            ErrorCode::NoDataset => 1002,
            ErrorCode::ModelNotTrained => 1003,
            ErrorCode::EmptyQuestion => 1004,

            ErrorCode::Unauthorized => 2001,
            ErrorCode::RateLimited => 2002,

            ErrorCode::NotFound => 4001,

            ErrorCode::BackendError => 8001,
            ErrorCode::InvalidResponse => 8002,
            ErrorCode::StoreError => 8003,

            ErrorCode::TransportError => 8501,
            ErrorCode::UnexpectedStatus => 8502,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("No dataset found for \"{file_name}\". Please generate a dataset first.")]
    NoDataset { file_name: String },

    #[error("Model for \"{file_id}\" is not trained yet. Please complete training first.")]
    ModelNotTrained { file_id: String },

    #[error("Please enter a question")]
    EmptyQuestion,

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    // Backend-reported errors
    #[error("{message}")]
    Backend { message: String },

    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("Document store error: {message}")]
    Store { message: String },

    // Transport errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Shorthand for a backend-reported failure.
    pub fn backend(message: impl Into<String>) -> Self {
        AppError::Backend {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::NoDataset { .. } => ErrorCode::NoDataset,
            AppError::ModelNotTrained { .. } => ErrorCode::ModelNotTrained,
            AppError::EmptyQuestion => ErrorCode::EmptyQuestion,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Backend { .. } => ErrorCode::BackendError,
            AppError::InvalidResponse { .. } => ErrorCode::InvalidResponse,
            AppError::Store { .. } => ErrorCode::StoreError,
            AppError::HttpClient(_) => ErrorCode::TransportError,
            AppError::UnexpectedStatus { .. } => ErrorCode::UnexpectedStatus,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Classify the error for surfacing
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. }
            | AppError::NoDataset { .. }
            | AppError::ModelNotTrained { .. }
            | AppError::EmptyQuestion => ErrorKind::Validation,

            AppError::Unauthorized { .. }
            | AppError::RateLimited { .. }
            | AppError::NotFound { .. }
            | AppError::Backend { .. }
            | AppError::Store { .. } => ErrorKind::Backend,

            AppError::HttpClient(_)
            | AppError::UnexpectedStatus { .. }
            | AppError::InvalidResponse { .. }
            | AppError::Serialization(_) => ErrorKind::Transport,

            AppError::Internal { .. } | AppError::Configuration { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error was caught before any network call
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Check if this error comes from the network layer rather than the service
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
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
