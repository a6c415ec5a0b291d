//! Scope Link
//!
//! Serial acquisition pipeline for a two-channel analog bench device.
//!
//! # Architecture
//!
//! ```text
//! serial bytes ─▶ AcquisitionLoop ─▶ Resynchronizer ─▶ PacketCodec ─▶ PacketSink / ReadingQueue
//! caller ─▶ CommandWriter ─(waits on busy flag, transport lock)─▶ serial port
//! ```
//!
//! - **Codec**: 12-byte packets, `0x62 0x62` marker, two big-endian ADC codes
//! - **Framer**: byte-at-a-time resynchronization after noise or partial reads
//! - **Acquisition**: background task polling the port and dispatching readings
//! - **Writer**: framed commands that never interleave with a read burst
//! - **Session**: connect/disconnect lifecycle over a [`transport::TransportBuilder`]
//! - **Plot**: routing readings onto an external plot surface
//!
//! # Features
//!
//! - `test-utils` - exposes the in-memory mock transport

pub mod acquisition;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod framer;
pub mod plot;
pub mod readings;
pub mod session;
pub mod transport;
pub mod writer;

// Re-export core types
pub use acquisition::{AcquisitionStats, BusyFlag};
pub use codec::{Packet, PacketCodec, Reading, MARKER, PACKET_LENGTH};
pub use commands::DeviceCommand;
pub use config::{
    AcquisitionConfig, CommandFraming, DisplayConfig, ScaleConfig, ScopeConfig, SerialSettings,
};
pub use error::{FormatError, Result, ScopeError};
pub use framer::Resynchronizer;
pub use plot::{PlotMode, PlotSurface, TraceRouter};
pub use readings::{PacketSink, ReadingQueue, ReadingReceiver};
pub use session::{SessionController, SessionState};
pub use writer::{CommandWriter, Payload};

/// Session over real serial ports
pub type SerialSession = SessionController<transport::SerialTransportBuilder>;
