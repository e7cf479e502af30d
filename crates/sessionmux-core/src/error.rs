//! Error types for `sessionmux` core library.

use thiserror::Error;

/// Result type alias using `sessionmux` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `sessionmux` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed `host:port` address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed `namespace/action` qualifier
    #[error("Invalid qualifier: {0}")]
    InvalidQualifier(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
