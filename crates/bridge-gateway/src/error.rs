//! Error types for the bridge gateway.
//!
//! All errors are strongly typed and propagated without panicking.
//! Security denials are deliberately NOT part of this enum: they live in
//! [`crate::identity::DenyReason`] so that `?` can never turn a denial into
//! a recoverable protocol error.

/// Gateway error types covering storage, payload and configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
