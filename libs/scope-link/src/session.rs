//! Session lifecycle
//!
//! [`SessionController`] owns the transport slot and the acquisition task.
//! `connect` builds and opens a transport and starts (or resumes) the loop;
//! `disconnect` pauses the loop, flushes unread input and closes the port.
//! The loop itself may also end a session when the link fails repeatedly,
//! which is published through [`SessionController::watch_state`].

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::acquisition::{
    AcquisitionHandle, AcquisitionLoop, AcquisitionStats, BusyFlag, SharedTransport,
};
use crate::codec::{PacketCodec, Reading};
use crate::commands::DeviceCommand;
use crate::config::{CommandFraming, ScopeConfig};
use crate::error::{Result, ScopeError};
use crate::readings::{PacketSink, ReadingQueue, ReadingReceiver};
use crate::transport::{Transport, TransportBuilder, TransportStats};
use crate::writer::{CommandWriter, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected => write!(f, "connected"),
        }
    }
}

type SinkSlot = Arc<Mutex<Option<Box<dyn PacketSink>>>>;

/// Fans each reading out to the latest-value cell, the user sink and the queue
struct Dispatcher {
    latest: Arc<watch::Sender<Option<Reading>>>,
    sink: SinkSlot,
    queue: ReadingQueue,
}

impl PacketSink for Dispatcher {
    fn on_reading(&mut self, reading: Reading) {
        self.latest.send_replace(Some(reading));
        if let Some(sink) = self.sink.lock().as_mut() {
            sink.on_reading(reading);
        }
        self.queue.publish(reading);
    }
}

/// Connect/disconnect control over one serial device
///
/// The acquisition task is spawned on the first successful `connect` and
/// then lives as long as the controller. `disconnect` pauses it and a later
/// `connect` resumes it on the new port; dropping the controller ends it.
pub struct SessionController<B: TransportBuilder> {
    config: ScopeConfig,
    builder: B,
    codec: PacketCodec,
    transport: SharedTransport<B::Transport>,
    busy: BusyFlag,
    queue: ReadingQueue,
    latest: Arc<watch::Sender<Option<Reading>>>,
    sink: SinkSlot,
    state: Arc<watch::Sender<SessionState>>,
    acquisition: Option<AcquisitionHandle>,
    port: Option<String>,
}

impl<B: TransportBuilder> fmt::Debug for SessionController<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("port", &self.port)
            .field("busy", &self.busy.is_busy())
            .finish()
    }
}

impl<B: TransportBuilder> SessionController<B> {
    /// Create a disconnected session; the configuration is validated here
    pub fn new(config: ScopeConfig, builder: B) -> Result<Self> {
        config.validate()?;

        let (state, _) = watch::channel(SessionState::Disconnected);
        let (latest, _) = watch::channel(None);

        Ok(Self {
            codec: PacketCodec::new(config.scale),
            queue: ReadingQueue::new(config.acquisition.queue_capacity),
            config,
            builder,
            transport: Arc::new(tokio::sync::Mutex::new(None)),
            busy: BusyFlag::new(),
            latest: Arc::new(latest),
            sink: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
            acquisition: None,
            port: None,
        })
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn codec(&self) -> &PacketCodec {
        &self.codec
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Port of the current or most recent connection
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// State changes, including a link lost by the acquisition loop
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Open `port` at `baud` and start streaming readings
    ///
    /// An existing connection is closed first. On failure the session stays
    /// disconnected.
    pub async fn connect(&mut self, port: &str, baud: u32) -> Result<()> {
        if self.transport.lock().await.is_some() {
            self.disconnect().await?;
        }

        let settings = self.config.serial.for_port(port, baud);
        let mut transport = self
            .builder
            .build(&settings)
            .map_err(|e| ScopeError::connection(e.to_string()))?;
        transport
            .open()
            .await
            .map_err(|e| ScopeError::connection(e.to_string()))?;

        *self.transport.lock().await = Some(transport);
        self.latest.send_replace(None);
        self.port = Some(port.to_string());

        match self.acquisition.as_ref().filter(|handle| handle.is_running()) {
            Some(handle) => handle.resume(),
            None => {
                let handle = self.spawn_loop();
                self.acquisition = Some(handle);
            },
        }

        self.state.send_replace(SessionState::Connected);
        info!("Connected to {port} @ {baud} baud");
        Ok(())
    }

    fn spawn_loop(&self) -> AcquisitionHandle {
        let dispatcher = Dispatcher {
            latest: Arc::clone(&self.latest),
            sink: Arc::clone(&self.sink),
            queue: self.queue.clone(),
        };
        AcquisitionLoop::new(
            Arc::clone(&self.transport),
            self.busy.clone(),
            self.config.acquisition.clone(),
            self.codec,
            Box::new(dispatcher),
            Arc::clone(&self.state),
        )
        .spawn()
    }

    /// Stop reading, discard unread input and close the port
    ///
    /// Safe to call in any state; repeated calls do nothing.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(handle) = &self.acquisition {
            handle.stop();
        }

        // waits for an in-flight read cycle to finish
        let taken = self.transport.lock().await.take();
        self.state.send_replace(SessionState::Disconnected);

        let Some(mut transport) = taken else {
            debug!("Disconnect requested while not connected");
            return Ok(());
        };

        if let Err(e) = transport.clear_input() {
            warn!("Failed to clear input on {}: {e}", transport.port_name());
        }
        transport.close()?;
        info!("Disconnected from {}", transport.port_name());
        Ok(())
    }

    /// New consumer of the drop-oldest reading queue
    pub fn subscribe(&self) -> ReadingReceiver {
        self.queue.subscribe()
    }

    /// Most recent reading of the current connection
    pub fn latest_reading(&self) -> Option<Reading> {
        *self.latest.borrow()
    }

    /// Watch for the most recent reading
    pub fn watch_latest(&self) -> watch::Receiver<Option<Reading>> {
        self.latest.subscribe()
    }

    /// Install a callback run on the acquisition task for every reading
    pub fn set_sink(&self, sink: impl PacketSink) {
        *self.sink.lock() = Some(Box::new(sink));
    }

    pub fn clear_sink(&self) {
        self.sink.lock().take();
    }

    /// Markers used by writers created after this call
    pub fn set_command_framing(&mut self, framing: CommandFraming) {
        self.config.framing = framing;
    }

    /// Writer bound to this session's transport
    pub fn writer(&self) -> CommandWriter<B::Transport> {
        CommandWriter::new(
            Arc::clone(&self.transport),
            self.busy.clone(),
            self.config.framing.clone(),
            self.config.acquisition.writer_poll_interval(),
        )
    }

    pub async fn send(&self, payload: impl Into<Payload>) -> Result<usize> {
        self.writer().send(payload).await
    }

    pub async fn send_command(&self, command: DeviceCommand) -> Result<usize> {
        debug!("Sending device command {command}");
        self.send(command).await
    }

    pub fn acquisition_stats(&self) -> AcquisitionStats {
        self.acquisition
            .as_ref()
            .map(AcquisitionHandle::stats)
            .unwrap_or_default()
    }

    /// Statistics of the open transport, if any
    pub async fn transport_stats(&self) -> Option<TransportStats> {
        self.transport.lock().await.as_ref().map(Transport::stats)
    }
}

impl<B: TransportBuilder> Drop for SessionController<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.acquisition.take() {
            handle.stop();
        }

        match self.transport.try_lock() {
            Ok(mut slot) => {
                if let Some(mut transport) = slot.take() {
                    if let Err(e) = transport.clear_input() {
                        warn!("Failed to clear input on drop: {e}");
                    }
                    if let Err(e) = transport.close() {
                        warn!("Failed to close {} on drop: {e}", transport.port_name());
                    }
                }
            },
            // the task was mid-cycle; the port closes when its last owner drops
            Err(_) => warn!("Transport locked during drop, deferring close"),
        }
        self.state.send_replace(SessionState::Disconnected);
    }
}
