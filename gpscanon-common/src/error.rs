//! Common error types for GPSCanon

use thiserror::Error;

use crate::units::ConvertError;

/// Common result type for GPSCanon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across GPSCanon crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Canonical registry failed load-time validation (fatal at startup)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Business-rule conflict, e.g. a profile-guard violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unit conversion error
    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
