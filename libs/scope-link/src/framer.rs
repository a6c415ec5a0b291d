//! Framing resynchronizer
//!
//! Accumulates the incoming byte stream and cuts it into marker-aligned
//! packets. Whenever the head of the buffer is not a marker the first byte
//! is dropped and the scan restarts, so the framer recovers from corruption
//! or a mid-packet connect without a fixed resync window.
//!
//! A marker pair inside noise is indistinguishable from a real packet
//! start: once 12 bytes are buffered at that position they are emitted as a
//! packet. This false positive is accepted.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{starts_with_marker, Packet, PACKET_LENGTH};

/// Result of one [`Resynchronizer::feed`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Packets emitted during this call
    pub packets: usize,
    /// Bytes dropped while searching for a marker
    pub discarded: usize,
}

/// Lifetime counters of a resynchronizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub bytes_fed: u64,
    pub packets_emitted: u64,
    pub bytes_discarded: u64,
}

/// Incremental packet framer
#[derive(Debug)]
pub struct Resynchronizer {
    buf: BytesMut,
    stats: FramerStats,
}

impl Default for Resynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Resynchronizer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(PACKET_LENGTH * 64),
            stats: FramerStats::default(),
        }
    }

    /// Append `data` and emit every complete packet, in order
    ///
    /// `emit` runs synchronously before the scan continues. Never blocks and
    /// never fails; unusable bytes are dropped and counted.
    pub fn feed<F>(&mut self, data: &[u8], mut emit: F) -> FeedOutcome
    where
        F: FnMut(Packet),
    {
        self.buf.extend_from_slice(data);
        self.stats.bytes_fed += data.len() as u64;

        let mut outcome = FeedOutcome::default();
        while self.buf.len() >= PACKET_LENGTH {
            if starts_with_marker(&self.buf) {
                let frame = self.buf.split_to(PACKET_LENGTH);
                match Packet::from_slice(&frame) {
                    Ok(packet) => {
                        outcome.packets += 1;
                        emit(packet);
                    },
                    // split_to always yields PACKET_LENGTH bytes starting with the marker
                    Err(e) => debug!("Unexpected frame rejection: {}", e),
                }
            } else {
                self.buf.advance(1);
                outcome.discarded += 1;
            }
        }

        self.stats.packets_emitted += outcome.packets as u64;
        self.stats.bytes_discarded += outcome.discarded as u64;
        if outcome.discarded > 0 {
            warn!(
                discarded = outcome.discarded,
                "Resynchronized: dropped {} bytes before marker", outcome.discarded
            );
        }

        outcome
    }

    /// Convenience wrapper collecting the emitted packets
    pub fn feed_collect(&mut self, data: &[u8]) -> Vec<Packet> {
        let mut packets = Vec::new();
        self.feed(data, |packet| packets.push(packet));
        packets
    }

    /// Bytes waiting for the rest of a packet
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop buffered bytes, e.g. after the port was closed
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }
}
