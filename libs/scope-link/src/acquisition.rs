//! Background acquisition loop
//!
//! A single task owns the read side of the port. Each cycle it takes the
//! transport lock, asks how many bytes are buffered and, if any, raises the
//! busy flag, drains them, and feeds the resynchronizer. The flag drops when
//! the decoded readings have been dispatched. The command writer waits on the
//! same flag so a command never lands in the middle of a read burst.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::PacketCodec;
use crate::config::AcquisitionConfig;
use crate::framer::Resynchronizer;
use crate::readings::PacketSink;
use crate::session::SessionState;
use crate::transport::{Transport, TransportError};

/// Transport slot shared by the loop, the writer and the session
///
/// `None` while disconnected.
pub type SharedTransport<T> = Arc<tokio::sync::Mutex<Option<T>>>;

/// Raised while the loop is draining the port
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Raise the flag until the returned guard is dropped
    pub fn hold(&self) -> BusyGuard<'_> {
        self.set();
        BusyGuard(self)
    }
}

/// Clears the busy flag on drop, including on early error returns
#[derive(Debug)]
pub struct BusyGuard<'a>(&'a BusyFlag);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Counters kept by the acquisition loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Cycles that found data to read
    pub read_cycles: u64,
    pub bytes_read: u64,
    pub packets: u64,
    /// Bytes dropped while resynchronizing
    pub bytes_discarded: u64,
    /// Cycles that ended in a transport error
    pub failed_cycles: u64,
    /// Times the link was declared lost and the port closed
    pub link_losses: u64,
}

#[derive(Debug, Default)]
struct LoopControl {
    stopped: AtomicBool,
    shutdown: AtomicBool,
    /// Drop partial packets before the next cycle
    reset: AtomicBool,
}

enum CycleOutcome {
    Idle,
    Read,
}

/// Owner side of a running acquisition task
///
/// Dropping the handle ends the task.
#[derive(Debug)]
pub struct AcquisitionHandle {
    control: Arc<LoopControl>,
    busy: BusyFlag,
    stats: Arc<Mutex<AcquisitionStats>>,
    task: Option<JoinHandle<()>>,
}

impl AcquisitionHandle {
    /// Pause reading; takes effect before the next cycle
    ///
    /// Bytes of an incomplete packet are discarded, so a later resume on a
    /// fresh port starts from a clean buffer.
    pub fn stop(&self) {
        self.control.reset.store(true, Ordering::Release);
        self.control.stopped.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.control.stopped.store(false, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.control.stopped.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn stats(&self) -> AcquisitionStats {
        *self.stats.lock()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Ask the task to exit after its current cycle and wait for it
    pub async fn shutdown(mut self) {
        self.control.shutdown.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Acquisition task ended abnormally: {e}");
                }
            }
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.control.shutdown.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The read loop itself; consumed by [`AcquisitionLoop::spawn`]
pub struct AcquisitionLoop<T: Transport> {
    transport: SharedTransport<T>,
    busy: BusyFlag,
    control: Arc<LoopControl>,
    config: AcquisitionConfig,
    codec: PacketCodec,
    framer: Resynchronizer,
    sink: Box<dyn PacketSink>,
    stats: Arc<Mutex<AcquisitionStats>>,
    state: Arc<watch::Sender<SessionState>>,
}

impl<T: Transport + 'static> AcquisitionLoop<T> {
    pub fn new(
        transport: SharedTransport<T>,
        busy: BusyFlag,
        config: AcquisitionConfig,
        codec: PacketCodec,
        sink: Box<dyn PacketSink>,
        state: Arc<watch::Sender<SessionState>>,
    ) -> Self {
        Self {
            transport,
            busy,
            control: Arc::new(LoopControl::default()),
            config,
            codec,
            framer: Resynchronizer::new(),
            sink,
            stats: Arc::new(Mutex::new(AcquisitionStats::default())),
            state,
        }
    }

    /// Start the loop on the current tokio runtime
    pub fn spawn(self) -> AcquisitionHandle {
        let control = Arc::clone(&self.control);
        let busy = self.busy.clone();
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run());

        AcquisitionHandle {
            control,
            busy,
            stats,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        info!(
            "Acquisition loop started (idle {}ms, backoff {}ms)",
            self.config.idle_interval_ms, self.config.error_backoff_ms
        );
        let mut buffer = Vec::with_capacity(1024);
        let mut consecutive_failures = 0u32;

        while !self.control.shutdown.load(Ordering::Acquire) {
            match self.cycle(&mut buffer).await {
                Ok(CycleOutcome::Read) => {
                    consecutive_failures = 0;
                    // yield so writers and consumers get a turn between bursts
                    tokio::task::yield_now().await;
                },
                Ok(CycleOutcome::Idle) => {
                    consecutive_failures = 0;
                    tokio::time::sleep(self.config.idle_interval()).await;
                },
                Err(e) => {
                    consecutive_failures += 1;
                    self.stats.lock().failed_cycles += 1;
                    warn!(
                        "Acquisition cycle failed ({}/{}): {}",
                        consecutive_failures, self.config.max_consecutive_failures, e
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        self.declare_link_lost().await;
                        consecutive_failures = 0;
                    }
                    tokio::time::sleep(self.config.error_backoff()).await;
                },
            }
        }

        info!("Acquisition loop stopped");
    }

    async fn cycle(&mut self, buffer: &mut Vec<u8>) -> Result<CycleOutcome, TransportError> {
        if self.control.reset.swap(false, Ordering::AcqRel) && self.framer.pending() > 0 {
            debug!("Discarding {} buffered bytes", self.framer.pending());
            self.framer.reset();
        }
        if self.control.stopped.load(Ordering::Acquire) {
            return Ok(CycleOutcome::Idle);
        }

        let slot = Arc::clone(&self.transport);
        let mut guard = slot.lock().await;
        let Some(transport) = guard.as_mut() else {
            self.framer.reset();
            return Ok(CycleOutcome::Idle);
        };
        // a transport drops its own port after an I/O failure
        if !transport.is_open() {
            self.framer.reset();
            return Err(TransportError::ConnectionLost(format!(
                "{} is no longer open",
                transport.port_name()
            )));
        }

        let available = transport.bytes_available()?;
        if available == 0 {
            return Ok(CycleOutcome::Idle);
        }

        let _busy = self.busy.hold();

        buffer.clear();
        buffer.resize(available, 0);
        let mut filled = 0;
        while filled < available {
            let n = transport.read(&mut buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let codec = &self.codec;
        let sink = &mut self.sink;
        let outcome = self
            .framer
            .feed(&buffer[..filled], |packet| sink.on_reading(codec.decode_packet(&packet)));

        debug!(
            bytes = filled,
            packets = outcome.packets,
            discarded = outcome.discarded,
            "Acquisition cycle"
        );

        let mut stats = self.stats.lock();
        stats.read_cycles += 1;
        stats.bytes_read += filled as u64;
        stats.packets += outcome.packets as u64;
        stats.bytes_discarded += outcome.discarded as u64;

        Ok(CycleOutcome::Read)
    }

    async fn declare_link_lost(&mut self) {
        let mut guard = self.transport.lock().await;
        if let Some(mut transport) = guard.take() {
            error!(
                "Serial link lost on {} after {} failed cycles, closing port",
                transport.port_name(),
                self.config.max_consecutive_failures
            );
            if let Err(e) = transport.close() {
                warn!("Error closing lost port: {e}");
            }
        }
        drop(guard);

        self.busy.clear();
        self.framer.reset();
        self.stats.lock().link_losses += 1;
        self.state.send_replace(SessionState::Disconnected);
    }
}
