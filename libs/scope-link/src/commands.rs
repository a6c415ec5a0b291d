//! Commands understood by the acquisition board firmware

use std::fmt;

use crate::writer::Payload;

/// One-byte device commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Begin streaming packets
    StartStreaming,
    /// Stop streaming packets
    StopStreaming,
    /// Select the sampling frequency; the value is passed through as-is
    SetFrequency(u8),
}

impl DeviceCommand {
    pub const START_BYTE: u8 = 0xFF;
    pub const STOP_BYTE: u8 = 0x00;

    pub fn to_byte(self) -> u8 {
        match self {
            DeviceCommand::StartStreaming => Self::START_BYTE,
            DeviceCommand::StopStreaming => Self::STOP_BYTE,
            DeviceCommand::SetFrequency(value) => value,
        }
    }

    pub fn to_payload(self) -> Payload {
        Payload::from(self.to_byte())
    }
}

impl From<DeviceCommand> for Payload {
    fn from(command: DeviceCommand) -> Self {
        command.to_payload()
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::StartStreaming => write!(f, "start"),
            DeviceCommand::StopStreaming => write!(f, "stop"),
            DeviceCommand::SetFrequency(value) => write!(f, "freq({value})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(DeviceCommand::StartStreaming.to_payload(), Payload::Bytes(vec![0xFF]));
        assert_eq!(DeviceCommand::StopStreaming.to_payload(), Payload::Bytes(vec![0x00]));
        assert_eq!(Payload::from(DeviceCommand::SetFrequency(40)), Payload::Bytes(vec![40]));
    }

    #[test]
    fn test_command_display() {
        assert_eq!(DeviceCommand::SetFrequency(5).to_string(), "freq(5)");
    }
}
