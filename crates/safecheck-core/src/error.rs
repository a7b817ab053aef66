//! Error types for safecheck-core.

use thiserror::Error;

/// Result type alias using safecheck-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for check-in, alert and escalation operations
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    // Lifecycle errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error("invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    // Outbound delivery errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not found error for an entity kind
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create a validation error for a field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is an invalid state error
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
