//! Packet codec
//!
//! Wire layout of one device packet (big-endian):
//!
//! ```text
//! offset  size  field
//! 0..2    2     sync marker 0x62 0x62 ("bb")
//! 2..6    4     reserved
//! 6..8    2     channel 1 raw ADC code (u16)
//! 8..10   2     channel 2 raw ADC code (u16)
//! 10..12  2     reserved
//! ```

use serde::Serialize;

use crate::config::ScaleConfig;
use crate::error::FormatError;

/// Length of one packet in bytes
pub const PACKET_LENGTH: usize = 12;

/// Sync marker byte, repeated twice at the start of each packet
pub const MARKER: u8 = 0x62;

const CH1_OFFSET: usize = 6;
const CH2_OFFSET: usize = 8;

/// True when `bytes` starts with the two-byte sync marker
#[inline]
pub fn starts_with_marker(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == MARKER && bytes[1] == MARKER
}

/// One marker-aligned 12 byte frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet([u8; PACKET_LENGTH]);

impl Packet {
    /// Validate length and marker
    pub fn from_slice(frame: &[u8]) -> Result<Self, FormatError> {
        let bytes: [u8; PACKET_LENGTH] =
            frame
                .try_into()
                .map_err(|_| FormatError::InvalidLength {
                    expected: PACKET_LENGTH,
                    got: frame.len(),
                })?;

        if !starts_with_marker(&bytes) {
            return Err(FormatError::MissingMarker {
                got: [bytes[0], bytes[1]],
            });
        }

        Ok(Self(bytes))
    }

    /// Build a packet from raw channel codes, reserved bytes zeroed
    pub fn from_raw(ch1: u16, ch2: u16) -> Self {
        let mut bytes = [0u8; PACKET_LENGTH];
        bytes[0] = MARKER;
        bytes[1] = MARKER;
        bytes[CH1_OFFSET..CH1_OFFSET + 2].copy_from_slice(&ch1.to_be_bytes());
        bytes[CH2_OFFSET..CH2_OFFSET + 2].copy_from_slice(&ch2.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_LENGTH] {
        &self.0
    }

    /// Raw ADC codes `(ch1, ch2)`
    pub fn raw_channels(&self) -> (u16, u16) {
        let ch1 = u16::from_be_bytes([self.0[CH1_OFFSET], self.0[CH1_OFFSET + 1]]);
        let ch2 = u16::from_be_bytes([self.0[CH2_OFFSET], self.0[CH2_OFFSET + 1]]);
        (ch1, ch2)
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Two channel voltages decoded from one packet
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub ch1: f64,
    pub ch2: f64,
}

/// Decodes packets into voltages using a fixed scale
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec {
    scale: ScaleConfig,
}

impl PacketCodec {
    pub fn new(scale: ScaleConfig) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> &ScaleConfig {
        &self.scale
    }

    /// Validate and decode a raw frame
    pub fn decode(&self, frame: &[u8]) -> Result<Reading, FormatError> {
        Packet::from_slice(frame).map(|packet| self.decode_packet(&packet))
    }

    /// Decode an already validated packet
    pub fn decode_packet(&self, packet: &Packet) -> Reading {
        let (ch1, ch2) = packet.raw_channels();
        Reading {
            ch1: self.scale.to_volts(ch1),
            ch2: self.scale.to_volts(ch2),
        }
    }
}

/// Decode with the default 3.3 V / 1024 scale
pub fn decode(frame: &[u8]) -> Result<Reading, FormatError> {
    PacketCodec::default().decode(frame)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn frame(hi1: u8, lo1: u8, hi2: u8, lo2: u8) -> [u8; PACKET_LENGTH] {
        [0x62, 0x62, 0, 0, 0, 0, hi1, lo1, hi2, lo2, 0, 0]
    }

    #[test]
    fn test_decode_half_scale() {
        let reading = decode(&frame(0x02, 0x00, 0x00, 0x00)).unwrap();
        assert!((reading.ch1 - 1.65).abs() < 1e-9);
        assert_eq!(reading.ch2, 0.0);
    }

    #[test]
    fn test_decode_matches_formula() {
        for (hi1, lo1, hi2, lo2) in [(0x00, 0x01, 0x03, 0xFF), (0x01, 0x80, 0x00, 0x40)] {
            let reading = decode(&frame(hi1, lo1, hi2, lo2)).unwrap();
            let raw1 = f64::from(hi1) * 256.0 + f64::from(lo1);
            let raw2 = f64::from(hi2) * 256.0 + f64::from(lo2);
            assert!((reading.ch1 - 3.3 * raw1 / 1024.0).abs() < 1e-9);
            assert!((reading.ch2 - 3.3 * raw2 / 1024.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reserved_bytes_ignored() {
        let mut bytes = frame(0x01, 0x00, 0x02, 0x00);
        bytes[2..6].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        bytes[10] = 0x55;
        bytes[11] = 0xAA;
        let packet = Packet::from_slice(&bytes).unwrap();
        assert_eq!(packet.raw_channels(), (256, 512));
    }

    #[test]
    fn test_rejects_short_frame() {
        let err = decode(&[0x62; 10]).unwrap_err();
        assert_eq!(
            err,
            FormatError::InvalidLength {
                expected: 12,
                got: 10
            }
        );
    }

    #[test]
    fn test_rejects_long_frame() {
        assert!(matches!(
            decode(&[0x62; 13]),
            Err(FormatError::InvalidLength { got: 13, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_marker() {
        let mut bytes = [0u8; PACKET_LENGTH];
        bytes[1] = 0x62;
        assert_eq!(
            decode(&bytes).unwrap_err(),
            FormatError::MissingMarker { got: [0x00, 0x62] }
        );

        let mut bytes = frame(0, 0, 0, 0);
        bytes[1] = 0x61;
        assert!(matches!(
            decode(&bytes),
            Err(FormatError::MissingMarker { .. })
        ));
    }

    #[test]
    fn test_from_raw_layout() {
        let packet = Packet::from_raw(0x0102, 0x0304);
        assert_eq!(
            packet.as_bytes(),
            &[0x62, 0x62, 0, 0, 0, 0, 0x01, 0x02, 0x03, 0x04, 0, 0]
        );
    }

    #[test]
    fn test_custom_scale() {
        let codec = PacketCodec::new(ScaleConfig {
            vref: 5.0,
            vmax: 4096.0,
        });
        let reading = codec.decode(Packet::from_raw(4096, 2048).as_ref()).unwrap();
        assert!((reading.ch1 - 5.0).abs() < 1e-9);
        assert!((reading.ch2 - 2.5).abs() < 1e-9);
    }
}
