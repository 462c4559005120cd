//! Error types for beacon.

use thiserror::Error;

/// Result type alias using beacon's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for beacon operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input; reported to the caller, never mutates state.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// SOS event not found
    #[error("Event not found: {0}")]
    EventNotFound(u64),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Authentication/authorization failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Session-level transport failure (disconnect, failed handshake)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
