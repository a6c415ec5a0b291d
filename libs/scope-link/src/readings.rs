//! Reading delivery
//!
//! The acquisition loop hands each decoded reading to a [`PacketSink`]
//! synchronously, so sinks must return quickly. [`ReadingQueue`] is the
//! default sink: a fixed-capacity queue that never blocks the loop and drops
//! the oldest readings when a consumer falls behind.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::codec::Reading;

/// Consumer of decoded readings, called on the acquisition task
pub trait PacketSink: Send + 'static {
    /// Must not block
    fn on_reading(&mut self, reading: Reading);
}

impl<F> PacketSink for F
where
    F: FnMut(Reading) + Send + 'static,
{
    fn on_reading(&mut self, reading: Reading) {
        self(reading)
    }
}

/// Bounded drop-oldest queue of readings
#[derive(Debug, Clone)]
pub struct ReadingQueue {
    tx: broadcast::Sender<Reading>,
    capacity: usize,
}

impl ReadingQueue {
    /// Queue holding at most `capacity` unread readings per subscriber
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Readings published after this call
    pub fn subscribe(&self) -> ReadingReceiver {
        ReadingReceiver {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    /// Publish without waiting; returns the number of subscribers reached
    pub fn publish(&self, reading: Reading) -> usize {
        // Err only means nobody is subscribed right now
        self.tx.send(reading).unwrap_or(0)
    }
}

impl PacketSink for ReadingQueue {
    fn on_reading(&mut self, reading: Reading) {
        self.publish(reading);
    }
}

/// Consumer end of a [`ReadingQueue`]
#[derive(Debug)]
pub struct ReadingReceiver {
    rx: broadcast::Receiver<Reading>,
    dropped: u64,
}

impl ReadingReceiver {
    /// Next reading; `None` once the queue is gone
    ///
    /// Readings overwritten while this receiver lagged are skipped and
    /// counted in [`ReadingReceiver::dropped`].
    pub async fn recv(&mut self) -> Option<Reading> {
        loop {
            match self.rx.recv().await {
                Ok(reading) => return Some(reading),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next reading if one is ready
    pub fn try_recv(&mut self) -> Option<Reading> {
        loop {
            match self.rx.try_recv() {
                Ok(reading) => return Some(reading),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Readings lost to the drop-oldest policy so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        warn!(
            skipped,
            total = self.dropped,
            "Reading consumer lagging, oldest readings dropped"
        );
    }
}
