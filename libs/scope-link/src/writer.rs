//! Outgoing command path
//!
//! Commands are framed as `start + payload + stop` and written in a single
//! `write_all`. The writer waits for the acquisition loop's busy flag to
//! drop, then takes the transport lock, so a command never splits a read
//! burst and two commands never interleave.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::acquisition::{BusyFlag, SharedTransport};
use crate::config::CommandFraming;
use crate::error::{Result, ScopeError};
use crate::transport::Transport;

/// Command body, either text (sent as UTF-8) or raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "text:{text}"),
            Payload::Bytes(bytes) => write!(f, "hex:{}", common::hex::dump(bytes)),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<u8> for Payload {
    fn from(byte: u8) -> Self {
        Payload::Bytes(vec![byte])
    }
}

/// Parses `text:<utf8>`, `hex:<digits>` and `byte:<0-255>`
///
/// Anything else is [`ScopeError::UnsupportedPayload`].
impl FromStr for Payload {
    type Err = ScopeError;

    fn from_str(spec: &str) -> Result<Self> {
        let (kind, body) = spec.split_once(':').ok_or_else(|| {
            ScopeError::unsupported_payload(format!(
                "'{spec}' has no kind prefix (expected text:, hex: or byte:)"
            ))
        })?;

        match kind.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Payload::Text(body.to_string())),
            "hex" => common::hex::parse(body)
                .map(Payload::Bytes)
                .ok_or_else(|| ScopeError::unsupported_payload(format!("invalid hex '{body}'"))),
            "byte" => parse_byte(body.trim())
                .map(Payload::from)
                .ok_or_else(|| {
                    ScopeError::unsupported_payload(format!("'{body}' is not a byte value"))
                }),
            other => Err(ScopeError::unsupported_payload(format!(
                "unknown payload kind '{other}'"
            ))),
        }
    }
}

fn parse_byte(text: &str) -> Option<u8> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Frames and writes commands to the shared transport
pub struct CommandWriter<T: Transport> {
    transport: SharedTransport<T>,
    busy: BusyFlag,
    framing: CommandFraming,
    poll_interval: Duration,
}

impl<T: Transport> Clone for CommandWriter<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            busy: self.busy.clone(),
            framing: self.framing.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<T: Transport> fmt::Debug for CommandWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandWriter")
            .field("framing", &self.framing)
            .field("poll_interval", &self.poll_interval)
            .field("busy", &self.busy.is_busy())
            .finish()
    }
}

impl<T: Transport> CommandWriter<T> {
    pub fn new(
        transport: SharedTransport<T>,
        busy: BusyFlag,
        framing: CommandFraming,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            busy,
            framing,
            poll_interval: poll_interval.max(Duration::from_micros(100)),
        }
    }

    pub fn framing(&self) -> &CommandFraming {
        &self.framing
    }

    pub fn set_framing(&mut self, framing: CommandFraming) {
        self.framing = framing;
    }

    /// Exact bytes `send` would write for `payload`
    pub fn frame(&self, payload: &Payload) -> Vec<u8> {
        self.framing.wrap(payload.as_bytes())
    }

    /// Write one framed command once the acquisition loop is idle
    ///
    /// Waits without limit while the loop is busy; see [`Self::send_timeout`].
    /// Must not be awaited from inside a [`crate::readings::PacketSink`].
    ///
    /// # Errors
    ///
    /// [`ScopeError::NotConnected`] when no port is open, or the transport
    /// error of the write itself.
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<usize> {
        let payload = payload.into();
        let frame = self.frame(&payload);

        loop {
            while self.busy.is_busy() {
                tokio::time::sleep(self.poll_interval).await;
            }

            let mut guard = self.transport.lock().await;
            if self.busy.is_busy() {
                continue;
            }

            let transport = guard
                .as_mut()
                .filter(|t| t.is_open())
                .ok_or(ScopeError::NotConnected)?;
            let written = transport.write_all(&frame).await?;
            debug!(
                port = transport.port_name(),
                payload = %payload,
                bytes = written,
                "Command sent"
            );
            return Ok(written);
        }
    }

    /// [`Self::send`] bounded by `limit`
    pub async fn send_timeout(&self, payload: impl Into<Payload>, limit: Duration) -> Result<usize> {
        tokio::time::timeout(limit, self.send(payload))
            .await
            .map_err(|_| ScopeError::Timeout(format!("command not sent within {limit:?}")))?
    }
}
