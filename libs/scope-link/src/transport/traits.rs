//! Transport Layer Traits
//!
//! The acquisition loop polls a transport for buffered bytes instead of
//! blocking in `read`, so the interface exposes the pending byte count and
//! keeps `close` synchronous for use from `Drop`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

use crate::config::SerialSettings;

/// Transport layer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Open failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Device vanished while open
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Send operation failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive operation failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Connection state for transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Last operation failed; the port has been dropped
    Error,
}

/// Transport statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
    pub disconnections: u64,
    pub last_connection: Option<SystemTime>,
    pub connection_state: ConnectionState,
}

impl TransportStats {
    pub fn new() -> Self {
        Self {
            bytes_sent: 0,
            bytes_received: 0,
            connection_attempts: 0,
            successful_connections: 0,
            failed_connections: 0,
            disconnections: 0,
            last_connection: None,
            connection_state: ConnectionState::Disconnected,
        }
    }

    pub fn record_connection_attempt(&mut self) {
        self.connection_attempts += 1;
        self.connection_state = ConnectionState::Connecting;
    }

    pub fn record_successful_connection(&mut self) {
        self.successful_connections += 1;
        self.last_connection = Some(SystemTime::now());
        self.connection_state = ConnectionState::Connected;
    }

    pub fn record_failed_connection(&mut self) {
        self.failed_connections += 1;
        self.connection_state = ConnectionState::Error;
    }

    pub fn record_disconnection(&mut self) {
        self.disconnections += 1;
        self.connection_state = ConnectionState::Disconnected;
    }

    pub fn record_bytes_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for TransportStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte-stream transport driven by the acquisition loop and command writer
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Get transport type identifier
    fn transport_type(&self) -> &str;

    /// Port identifier this transport talks to
    fn port_name(&self) -> &str;

    /// Open the underlying port
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Close the port; a no-op when already closed
    fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Number of bytes that can be read without waiting
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Read up to `buffer.len()` bytes
    ///
    /// # Returns
    ///
    /// `Ok(bytes_read)` if successful, `Err` otherwise
    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;

    /// Write the whole buffer in one operation
    ///
    /// # Returns
    ///
    /// `Ok(bytes_sent)` if successful, `Err` otherwise
    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Discard bytes buffered by the OS but not yet read
    fn clear_input(&mut self) -> Result<(), TransportError>;

    fn stats(&self) -> TransportStats;
}

/// Creates transports for the session controller on each connect
pub trait TransportBuilder: Send + Sync {
    /// Transport implementation type
    type Transport: Transport + 'static;

    /// Create a closed transport for the given line settings
    fn build(&self, settings: &SerialSettings) -> Result<Self::Transport, TransportError>;
}
