//! Error types for the cell model

use thiserror::Error;

/// Main error type for cellgrid operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration error: malformed topology or virtual cluster definition.
    /// Fatal at load time; never coerced into a partial model.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for a scheduling request or a bind result
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity (cell, virtual cluster, reservation) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error reading configuration
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}
