//! Mock Transport for Testing
//!
//! In-memory transport whose state is shared through a [`MockHandle`], so a
//! test can inject device bytes and inspect writes after the transport has
//! been moved into a session.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use super::traits::{ConnectionState, Transport, TransportBuilder, TransportError, TransportStats};
use crate::config::SerialSettings;

/// Mock transport state
#[derive(Debug, Default)]
struct MockState {
    open: bool,
    /// Bytes the "device" has sent and the host has not read yet
    receive_queue: VecDeque<u8>,
    /// One entry per `write_all` call
    sent_data: Vec<Vec<u8>>,
    fail_open: bool,
    fail_receive: bool,
    fail_send: bool,
    /// Device gone: the next I/O call fails and closes the port
    unplugged: bool,
    /// Number of `clear_input` calls
    clear_count: usize,
    /// `(port, baud)` of every transport built from this handle
    built_for: Vec<(String, u32)>,
    stats: TransportStats,
}

impl MockState {
    fn check_plugged(&mut self) -> Result<(), TransportError> {
        if self.unplugged {
            self.open = false;
            self.stats.connection_state = ConnectionState::Error;
            return Err(TransportError::ConnectionLost(
                "Mock device unplugged".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared view of a mock transport
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the device had sent them
    pub fn push_rx(&self, data: &[u8]) {
        self.state.lock().receive_queue.extend(data.iter().copied());
    }

    pub fn pending_rx(&self) -> usize {
        self.state.lock().receive_queue.len()
    }

    /// All writes, one entry per `write_all`
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent_data.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().clear_count
    }

    pub fn built_for(&self) -> Vec<(String, u32)> {
        self.state.lock().built_for.clone()
    }

    pub fn stats(&self) -> TransportStats {
        self.state.lock().stats.clone()
    }

    pub fn set_open_failure(&self, should_fail: bool) {
        self.state.lock().fail_open = should_fail;
    }

    pub fn set_receive_failure(&self, should_fail: bool) {
        self.state.lock().fail_receive = should_fail;
    }

    pub fn set_send_failure(&self, should_fail: bool) {
        self.state.lock().fail_send = should_fail;
    }

    /// Pull the cable: I/O fails once and drops the port, and opens fail
    /// until plugged back in
    pub fn set_unplugged(&self, unplugged: bool) {
        self.state.lock().unplugged = unplugged;
    }
}

/// Mock transport implementation
#[derive(Debug)]
pub struct MockTransport {
    port: String,
    handle: MockHandle,
}

impl MockTransport {
    pub fn new(port: impl Into<String>, handle: MockHandle) -> Self {
        Self {
            port: port.into(),
            handle,
        }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_type(&self) -> &str {
        "mock"
    }

    fn port_name(&self) -> &str {
        &self.port
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        state.stats.record_connection_attempt();

        if state.fail_open || state.unplugged {
            state.stats.record_failed_connection();
            return Err(TransportError::ConnectionFailed(format!(
                "Mock open failure on {}",
                self.port
            )));
        }

        state.open = true;
        state.stats.record_successful_connection();
        debug!("Mock transport opened: {}", self.port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        if state.open {
            state.open = false;
            state.stats.record_disconnection();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.state.lock().open
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let mut state = self.handle.state.lock();
        if !state.open {
            return Err(TransportError::ReceiveFailed("Mock port not open".to_string()));
        }
        state.check_plugged()?;
        if state.fail_receive {
            state.stats.connection_state = ConnectionState::Error;
            return Err(TransportError::ConnectionLost(
                "Mock receive failure".to_string(),
            ));
        }
        Ok(state.receive_queue.len())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.handle.state.lock();
        if !state.open {
            return Err(TransportError::ReceiveFailed("Mock port not open".to_string()));
        }
        state.check_plugged()?;
        if state.fail_receive {
            return Err(TransportError::ReceiveFailed(
                "Mock receive failure".to_string(),
            ));
        }

        let count = buffer.len().min(state.receive_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.receive_queue.drain(..count)) {
            *slot = byte;
        }
        state.stats.record_bytes_received(count);
        Ok(count)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.handle.state.lock();
        if !state.open {
            return Err(TransportError::SendFailed("Mock port not open".to_string()));
        }
        state.check_plugged()?;
        if state.fail_send {
            return Err(TransportError::SendFailed("Mock send failure".to_string()));
        }

        state.sent_data.push(data.to_vec());
        state.stats.record_bytes_sent(data.len());
        Ok(data.len())
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        let mut state = self.handle.state.lock();
        state.receive_queue.clear();
        state.clear_count += 1;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.handle.state.lock().stats.clone()
    }
}

/// Builds mock transports that all share one handle
#[derive(Debug, Clone, Default)]
pub struct MockTransportBuilder {
    handle: MockHandle,
}

impl MockTransportBuilder {
    pub fn new(handle: MockHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl TransportBuilder for MockTransportBuilder {
    type Transport = MockTransport;

    fn build(&self, settings: &SerialSettings) -> Result<Self::Transport, TransportError> {
        self.handle
            .state
            .lock()
            .built_for
            .push((settings.port.clone(), settings.baud_rate));
        Ok(MockTransport::new(settings.port.clone(), self.handle.clone()))
    }
}
