//! Configuration for the acquisition pipeline
//!
//! All scaling constants and timing knobs live here and are handed to the
//! codec, loop and writer at construction time.

use common::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, ScopeError};
use crate::plot::PlotMode;

/// Default baud rate of the bench device
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Top-level configuration loaded by front ends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub serial: SerialSettings,
    pub scale: ScaleConfig,
    pub framing: CommandFraming,
    pub acquisition: AcquisitionConfig,
    pub display: DisplayConfig,
    pub logging: LogConfig,
}

impl ScopeConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;
        self.scale.validate()?;
        self.acquisition.validate()?;
        self.display.validate()
    }
}

/// Serial line parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Serial port path (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity ("None", "Even", "Odd")
    pub parity: String,
    /// Flow control ("None", "Software", "Hardware")
    pub flow_control: String,
    /// OS-level read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: "None".to_string(),
            flow_control: "None".to_string(),
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
        }
    }
}

impl SerialSettings {
    /// Same settings for another port and baud rate
    pub fn for_port(&self, port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            ..self.clone()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(ScopeError::config("Port path cannot be empty"));
        }

        if self.baud_rate == 0 {
            return Err(ScopeError::config("Baud rate must be greater than zero"));
        }

        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(ScopeError::config("Data bits must be 5, 6, 7, or 8"));
        }

        if ![1, 2].contains(&self.stop_bits) {
            return Err(ScopeError::config("Stop bits must be 1 or 2"));
        }

        if !["None", "Even", "Odd"].contains(&self.parity.as_str()) {
            return Err(ScopeError::config("Parity must be None, Even, or Odd"));
        }

        if !["None", "Software", "Hardware"].contains(&self.flow_control.as_str()) {
            return Err(ScopeError::config(
                "Flow control must be None, Software, or Hardware",
            ));
        }

        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ScopeError::config("Timeouts must be greater than zero"));
        }

        Ok(())
    }
}

/// ADC scaling: `volts = raw * vref / vmax`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// ADC reference voltage
    pub vref: f64,
    /// Full-scale ADC code
    pub vmax: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            vref: 3.3,
            vmax: 1024.0,
        }
    }
}

impl ScaleConfig {
    /// Convert a raw ADC code to volts
    #[inline]
    pub fn to_volts(&self, raw: u16) -> f64 {
        f64::from(raw) * self.vref / self.vmax
    }

    pub fn validate(&self) -> Result<()> {
        if !self.vmax.is_finite() || self.vmax <= 0.0 {
            return Err(ScopeError::config("vmax must be a positive number"));
        }
        if !self.vref.is_finite() {
            return Err(ScopeError::config("vref must be finite"));
        }
        Ok(())
    }
}

/// Markers wrapped around every outgoing command
///
/// Empty strings disable framing on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandFraming {
    pub start_marker: String,
    pub stop_marker: String,
}

impl Default for CommandFraming {
    fn default() -> Self {
        Self {
            start_marker: "#".to_string(),
            stop_marker: "\n".to_string(),
        }
    }
}

impl CommandFraming {
    /// No markers; the payload goes on the wire as-is
    pub fn raw() -> Self {
        Self {
            start_marker: String::new(),
            stop_marker: String::new(),
        }
    }

    /// `start + payload + stop` as one buffer
    pub fn wrap(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame =
            Vec::with_capacity(self.start_marker.len() + payload.len() + self.stop_marker.len());
        frame.extend_from_slice(self.start_marker.as_bytes());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(self.stop_marker.as_bytes());
        frame
    }
}

/// Acquisition loop timing and failure policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sleep when the port is closed, stopped, or has nothing to read
    pub idle_interval_ms: u64,
    /// Writer poll interval while the loop is busy
    pub writer_poll_interval_ms: u64,
    /// Sleep after a failed cycle
    pub error_backoff_ms: u64,
    /// Consecutive failed cycles before the link is declared lost
    pub max_consecutive_failures: u32,
    /// Reading queue capacity; the oldest readings are dropped when full
    pub queue_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: 5,
            writer_poll_interval_ms: 1,
            error_backoff_ms: 100,
            max_consecutive_failures: 3,
            queue_capacity: 256,
        }
    }
}

impl AcquisitionConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn writer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.writer_poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle_interval_ms == 0 {
            return Err(ScopeError::config("idle_interval_ms must be at least 1"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ScopeError::config(
                "max_consecutive_failures must be at least 1",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ScopeError::config("queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Trace rendering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Time window in seconds before the trace wraps
    pub x_limit: f64,
    /// Voltage half-range of the plot
    pub y_limit: f64,
    /// Seconds between consecutive packets (device streams at 40 Hz)
    pub sample_period: f64,
    pub mode: PlotMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            x_limit: 20.0,
            y_limit: 3.5,
            sample_period: 1.0 / 40.0,
            mode: PlotMode::TimeSeries,
        }
    }
}

impl DisplayConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.x_limit) || !positive(self.sample_period) {
            return Err(ScopeError::config(
                "x_limit and sample_period must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScopeConfig::default();
        assert_eq!(config.serial.baud_rate, 57600);
        assert_eq!(config.framing.start_marker, "#");
        assert_eq!(config.framing.stop_marker, "\n");
        assert_eq!(config.acquisition.idle_interval(), Duration::from_millis(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serial_validation() {
        let mut settings = SerialSettings::default();
        assert!(settings.validate().is_ok());

        settings.port = String::new();
        assert!(settings.validate().is_err());

        settings.port = "/dev/ttyUSB0".to_string();
        settings.baud_rate = 0;
        assert!(settings.validate().is_err());

        settings.baud_rate = 57600;
        settings.data_bits = 9;
        assert!(settings.validate().is_err());

        settings.data_bits = 8;
        settings.parity = "Mark".to_string();
        assert!(settings.validate().is_err());

        settings.parity = "None".to_string();
        settings.write_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_for_port_keeps_line_settings() {
        let settings = SerialSettings {
            parity: "Even".to_string(),
            ..Default::default()
        };
        let other = settings.for_port("COM7", 9600);
        assert_eq!(other.port, "COM7");
        assert_eq!(other.baud_rate, 9600);
        assert_eq!(other.parity, "Even");
    }

    #[test]
    fn test_scale_to_volts() {
        let scale = ScaleConfig::default();
        assert!((scale.to_volts(512) - 1.65).abs() < 1e-9);
        assert_eq!(scale.to_volts(0), 0.0);

        let bad = ScaleConfig {
            vref: 3.3,
            vmax: 0.0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_framing_wrap() {
        let framing = CommandFraming::default();
        assert_eq!(framing.wrap(b"F10"), b"#F10\n".to_vec());
        assert_eq!(CommandFraming::raw().wrap(&[0xFF]), vec![0xFF]);
    }

    #[test]
    fn test_partial_yaml_like_json_uses_defaults() {
        let config: ScopeConfig =
            serde_json::from_str(r#"{"serial": {"port": "COM3"}, "framing": {"start_marker": ""}}"#)
                .unwrap();
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.serial.baud_rate, 57600);
        assert_eq!(config.framing.start_marker, "");
        assert_eq!(config.framing.stop_marker, "\n");
    }
}
