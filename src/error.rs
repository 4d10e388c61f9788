//! Error types for the Hubgate service.

use thiserror::Error;

/// Main error type for Hubgate operations.
#[derive(Error, Debug)]
pub enum HubgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Hubgate operations.
pub type Result<T> = std::result::Result<T, HubgateError>;
