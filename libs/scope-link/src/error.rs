//! Error types for the acquisition pipeline

use thiserror::Error;

use crate::transport::TransportError;

/// Malformed packet frame
///
/// Recovered locally by the resynchronizer; only surfaced by direct
/// [`crate::codec::PacketCodec::decode`] calls.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Frame is not exactly one packet long
    #[error("Invalid frame length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    /// First two bytes are not the sync marker
    #[error("Missing sync marker: got {:#04x} {:#04x}", got[0], got[1])]
    MissingMarker { got: [u8; 2] },
}

/// Errors surfaced to callers of the session, writer and codec
#[derive(Error, Debug)]
pub enum ScopeError {
    /// Malformed frame
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Transport could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// Command payload kind is not text or raw bytes
    #[error("Unsupported payload: {0}")]
    UnsupportedPayload(String),

    /// Operation needs an open transport
    #[error("Not connected")]
    NotConnected,

    /// Steady-state transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-imposed deadline elapsed
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type alias for the acquisition pipeline
pub type Result<T> = std::result::Result<T, ScopeError>;

impl ScopeError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        ScopeError::Connection(msg.into())
    }

    /// Create an unsupported payload error
    pub fn unsupported_payload(msg: impl Into<String>) -> Self {
        ScopeError::UnsupportedPayload(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ScopeError::Config(msg.into())
    }
}
