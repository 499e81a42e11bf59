//! Protocol error types

use thiserror::Error;

/// Errors raised while interpreting wire messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A required field was absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Invalid message format
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    /// Enumeration value outside the known range
    #[error("Unknown {kind} value: {value}")]
    UnknownEnumValue { kind: &'static str, value: i32 },
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
