//! Common error types for the coachbook sync engine

use thiserror::Error;

/// Common result type for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the sync engine
#[derive(Error, Debug)]
pub enum Error {
    /// Local cache database error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Remote record store request error (wraps reqwest::Error)
    #[error("Record store error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal engine error
    #[error("Internal error: {0}")]
    Internal(String),
}
