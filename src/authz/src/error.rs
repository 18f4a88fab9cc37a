//! Error types for the ACL engine

use crate::types::PatternType;
use thiserror::Error;

/// ACL engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Required configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request carried a resource pattern type other than literal
    #[error("Only literal resources are supported. Got: {0}")]
    UnsupportedPatternType(PatternType),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// A row from the external store could not be mapped
    #[error("Row mapping error: {0}")]
    RowMapping(String),

    /// The credential snapshot has not been loaded yet
    #[error("Credential snapshot unavailable")]
    CredentialsUnavailable,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ACL engine operations
pub type Result<T> = std::result::Result<T, AuthzError>;
