//! Error types for the serving core

use std::fmt;

use thiserror::Error;

/// Which credential check rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Access token missing or wrong on every channel
    ApiKey,
    /// HTTP Basic username or password mismatch
    Basic,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey => f.write_str("Could not validate credentials"),
            Self::Basic => f.write_str("Incorrect email or password"),
        }
    }
}

/// Core error type for serving operations
#[derive(Error, Debug)]
pub enum ServeError {
    /// Credential check failed
    #[error("{0}")]
    Unauthorized(AuthFailure),

    /// Payload does not match the expected structure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Policy handle or batch writer failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Invalid configuration detected at startup or first use
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ServeError {
    /// Whether the caller sent something wrong, as opposed to a server-side fault
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Validation(_))
    }
}

/// Result type alias for serving operations
pub type Result<T> = std::result::Result<T, ServeError>;
