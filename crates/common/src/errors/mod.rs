//! Error types for GraphSearch
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for each failure mode of the query pipeline
//! - Transient vs. terminal classification used by the retry layer
//! - Error codes for machine-readable identification

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    ConfigurationError,
    ValidationError,

    // Data errors (2xxx)
    DataIntegrityError,
    UnknownEntity,

    // Model errors (3xxx)
    RateLimited,
    TransportError,
    ModelRequestError,
    ModelUnavailable,

    // Vector store errors (4xxx)
    StoreUnavailable,
    DimensionMismatch,

    // Question generation (5xxx)
    NoValidQuestions,

    // Internal errors (9xxx)
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ConfigurationError => 1001,
            ErrorCode::ValidationError => 1002,

            ErrorCode::DataIntegrityError => 2001,
            ErrorCode::UnknownEntity => 2002,

            ErrorCode::RateLimited => 3001,
            ErrorCode::TransportError => 3002,
            ErrorCode::ModelRequestError => 3003,
            ErrorCode::ModelUnavailable => 3004,

            ErrorCode::StoreUnavailable => 4001,
            ErrorCode::DimensionMismatch => 4002,

            ErrorCode::NoValidQuestions => 5001,

            ErrorCode::SerializationError => 9001,
            ErrorCode::IoError => 9002,
            ErrorCode::InternalError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // Knowledge base errors
    #[error("Data integrity error: {message}")]
    DataIntegrity { message: String },

    #[error("Entity not found in knowledge base: {id}")]
    UnknownEntity { id: String },

    // Language model errors
    #[error("Rate limited by {operation}")]
    RateLimited {
        operation: String,
        retry_after: Option<Duration>,
    },

    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("Model request rejected ({status}): {message}")]
    ModelRequest { status: u16, message: String },

    #[error("Model unavailable for {operation} after {attempts} attempt(s): {message}")]
    ModelUnavailable {
        operation: String,
        attempts: u32,
        message: String,
    },

    // Vector store errors
    #[error("Vector store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Question generation
    #[error("No valid questions in model response")]
    NoValidQuestions { raw: String },

    // Internal errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a data integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        AppError::DataIntegrity {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::DataIntegrity { .. } => ErrorCode::DataIntegrityError,
            AppError::UnknownEntity { .. } => ErrorCode::UnknownEntity,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Transport { .. } => ErrorCode::TransportError,
            AppError::ModelRequest { .. } => ErrorCode::ModelRequestError,
            AppError::ModelUnavailable { .. } => ErrorCode::ModelUnavailable,
            AppError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::NoValidQuestions { .. } => ErrorCode::NoValidQuestions,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Io(_) => ErrorCode::IoError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a model call failing with this error may be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited { .. } | AppError::Transport { .. }
        )
    }

    /// Server-suggested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error must abort the whole pipeline rather than one request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Configuration { .. } | AppError::StoreUnavailable { .. }
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation {
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

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::StoreUnavailable {
            message: err.to_string(),
        }
    }
}
