//! Error types for the Linky core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Linky operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A user identifier or public key could not be decoded.
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
