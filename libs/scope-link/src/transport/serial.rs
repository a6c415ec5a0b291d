//! Serial Transport Implementation
//!
//! Wraps a `tokio-serial` stream. The port handle lives in an `Option`;
//! dropping it closes the device, so `close` and `Drop` need no I/O.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use super::traits::{ConnectionState, Transport, TransportBuilder, TransportError, TransportStats};
use crate::config::SerialSettings;

/// Serial transport implementation
#[derive(Debug)]
pub struct SerialTransport {
    settings: SerialSettings,
    connection: Option<SerialStream>,
    stats: TransportStats,
}

impl SerialTransport {
    /// Create a closed transport; settings are validated up front
    pub fn new(settings: SerialSettings) -> Result<Self, TransportError> {
        settings
            .validate()
            .map_err(|e| TransportError::ConfigError(e.to_string()))?;

        Ok(Self {
            settings,
            connection: None,
            stats: TransportStats::new(),
        })
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn parse_parity(&self) -> tokio_serial::Parity {
        match self.settings.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    fn parse_flow_control(&self) -> tokio_serial::FlowControl {
        match self.settings.flow_control.as_str() {
            "Software" => tokio_serial::FlowControl::Software,
            "Hardware" => tokio_serial::FlowControl::Hardware,
            _ => tokio_serial::FlowControl::None,
        }
    }

    fn parse_data_bits(&self) -> tokio_serial::DataBits {
        match self.settings.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn parse_stop_bits(&self) -> tokio_serial::StopBits {
        match self.settings.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }

    /// Drop the port after an I/O failure
    fn mark_broken(&mut self) {
        self.connection = None;
        self.stats.connection_state = ConnectionState::Error;
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn transport_type(&self) -> &str {
        "serial"
    }

    fn port_name(&self) -> &str {
        &self.settings.port
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.connection.is_some() {
            return Ok(());
        }
        self.stats.record_connection_attempt();
        debug!(
            "Opening serial port: {} @ {} baud",
            self.settings.port, self.settings.baud_rate
        );

        let port_result = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(self.parse_data_bits())
            .parity(self.parse_parity())
            .stop_bits(self.parse_stop_bits())
            .flow_control(self.parse_flow_control())
            .timeout(self.settings.read_timeout())
            .open_native_async();

        match port_result {
            Ok(mut port) => {
                #[cfg(unix)]
                port.set_exclusive(false).map_err(|e| {
                    TransportError::IoError(format!("Failed to set exclusive mode: {e}"))
                })?;

                self.connection = Some(port);
                self.stats.record_successful_connection();
                info!("Serial port opened: {}", self.settings.port);
                Ok(())
            },
            Err(e) => {
                let error_msg = format!("Failed to open serial port {}: {e}", self.settings.port);
                error!("{error_msg}");
                self.stats.record_failed_connection();
                Err(TransportError::ConnectionFailed(error_msg))
            },
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.connection.take().is_some() {
            self.stats.record_disconnection();
            info!("Serial port closed: {}", self.settings.port);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let port = self
            .connection
            .as_ref()
            .ok_or_else(|| TransportError::ReceiveFailed("Serial port not open".to_string()))?;

        match port.bytes_to_read() {
            Ok(count) => Ok(count as usize),
            Err(e) => {
                let error_msg = format!("Failed to query input buffer: {e}");
                error!("{error_msg}");
                self.mark_broken();
                Err(TransportError::ConnectionLost(error_msg))
            },
        }
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let read_timeout = self.settings.read_timeout();
        let port = self
            .connection
            .as_mut()
            .ok_or_else(|| TransportError::ReceiveFailed("Serial port not open".to_string()))?;

        match timeout(read_timeout, port.read(buffer)).await {
            Ok(Ok(0)) => {
                // EOF on a serial device means it went away
                self.mark_broken();
                Err(TransportError::ConnectionLost(
                    "Serial port returned end of stream".to_string(),
                ))
            },
            Ok(Ok(bytes_read)) => {
                self.stats.record_bytes_received(bytes_read);
                debug!(
                    hex_data = %common::hex::dump(&buffer[..bytes_read]),
                    length = bytes_read,
                    direction = "recv",
                    "[Serial Transport] Raw bytes"
                );
                Ok(bytes_read)
            },
            Ok(Err(e)) => {
                let error_msg = format!("Failed to receive data: {e}");
                error!("{error_msg}");
                self.mark_broken();
                Err(TransportError::ReceiveFailed(error_msg))
            },
            Err(_) => {
                let error_msg = format!("Receive operation timed out after {read_timeout:?}");
                debug!("{error_msg}");
                Err(TransportError::Timeout(error_msg))
            },
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let write_timeout = self.settings.write_timeout();
        let port = self
            .connection
            .as_mut()
            .ok_or_else(|| TransportError::SendFailed("Serial port not open".to_string()))?;

        let send_operation = async {
            port.write_all(data).await?;
            port.flush().await?;
            Ok::<_, std::io::Error>(data.len())
        };

        match timeout(write_timeout, send_operation).await {
            Ok(Ok(bytes_sent)) => {
                self.stats.record_bytes_sent(bytes_sent);
                debug!(
                    hex_data = %common::hex::dump(data),
                    length = bytes_sent,
                    direction = "send",
                    "[Serial Transport] Raw bytes"
                );
                Ok(bytes_sent)
            },
            Ok(Err(e)) => {
                let error_msg = format!("Failed to send data: {e}");
                error!("{error_msg}");
                self.mark_broken();
                Err(TransportError::SendFailed(error_msg))
            },
            Err(_) => {
                let error_msg = format!("Send operation timed out after {write_timeout:?}");
                warn!("{error_msg}");
                Err(TransportError::Timeout(error_msg))
            },
        }
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        match self.connection.as_ref() {
            Some(port) => port
                .clear(ClearBuffer::Input)
                .map_err(|e| TransportError::IoError(format!("Failed to clear input: {e}"))),
            None => Ok(()),
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// Builds [`SerialTransport`]s for the session controller
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialTransportBuilder;

impl SerialTransportBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TransportBuilder for SerialTransportBuilder {
    type Transport = SerialTransport;

    fn build(&self, settings: &SerialSettings) -> Result<Self::Transport, TransportError> {
        SerialTransport::new(settings.clone())
    }
}
