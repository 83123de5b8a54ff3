//! Error types and handling for Lampyris
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Lampyris operations
pub type Result<T> = std::result::Result<T, LampyrisError>;

/// Main error type for Lampyris
#[derive(Debug, Error)]
pub enum LampyrisError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Advertisement payloads that fail the tag or length checks
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    /// Reading store errors (open, insert, query, update)
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Carbon-intensity enrichment errors
    #[error("Enrichment error: {message}")]
    Enrichment { message: String },

    /// Dataset/live-telemetry upload errors
    #[error("Upload error: {message}")]
    Upload { message: String },

    /// Scan transport errors (spawn, read, stop, stall)
    #[error("Scan transport error: {message}")]
    Transport { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

impl LampyrisError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        LampyrisError::Config {
            message: message.into(),
        }
    }

    /// Create a new malformed-payload error
    pub fn malformed_payload<S: Into<String>>(message: S) -> Self {
        LampyrisError::MalformedPayload {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        LampyrisError::Storage {
            message: message.into(),
        }
    }

    /// Create a new enrichment error
    pub fn enrichment<S: Into<String>>(message: S) -> Self {
        LampyrisError::Enrichment {
            message: message.into(),
        }
    }

    /// Create a new upload error
    pub fn upload<S: Into<String>>(message: S) -> Self {
        LampyrisError::Upload {
            message: message.into(),
        }
    }

    /// Create a new scan transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        LampyrisError::Transport {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        LampyrisError::Network {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        LampyrisError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        LampyrisError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for LampyrisError {
    fn from(err: std::io::Error) -> Self {
        LampyrisError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for LampyrisError {
    fn from(err: serde_yaml::Error) -> Self {
        LampyrisError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LampyrisError {
    fn from(err: serde_json::Error) -> Self {
        LampyrisError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for LampyrisError {
    fn from(err: reqwest::Error) -> Self {
        LampyrisError::network(err.to_string())
    }
}

impl From<rusqlite::Error> for LampyrisError {
    fn from(err: rusqlite::Error) -> Self {
        LampyrisError::storage(err.to_string())
    }
}

impl From<chrono::ParseError> for LampyrisError {
    fn from(err: chrono::ParseError) -> Self {
        LampyrisError::Validation {
            field: "datetime".to_string(),
            message: err.to_string(),
        }
    }
}
