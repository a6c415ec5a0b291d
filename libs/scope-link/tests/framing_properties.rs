//! Stream Framing Integration Tests
//!
//! Exercises the public codec and resynchronizer against byte streams the
//! device link actually produces:
//! - packets split at every possible boundary
//! - noise between packets
//! - marker pairs that appear inside noise
//! - decoding of the emitted frames

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use scope_link::codec::decode;
use scope_link::{FormatError, Packet, PacketCodec, Reading, Resynchronizer, ScaleConfig, MARKER};

fn frame(hi1: u8, lo1: u8, hi2: u8, lo2: u8) -> [u8; 12] {
    [MARKER, MARKER, 0, 0, 0, 0, hi1, lo1, hi2, lo2, 0, 0]
}

/// Noise with no two consecutive marker bytes
fn noise(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| {
            let b = seed.wrapping_mul(31).wrapping_add((i as u8).wrapping_mul(17));
            if b == MARKER {
                b.wrapping_add(1)
            } else {
                b
            }
        })
        .collect()
}

// ============================================================================
// Decode
// ============================================================================

#[test]
fn test_decode_spot_values() {
    let reading = decode(&frame(0x02, 0x00, 0x00, 0x00)).unwrap();
    assert!((reading.ch1 - 1.65).abs() < 1e-12);
    assert_eq!(reading.ch2, 0.0);

    for (hi, lo) in [(0x00, 0x01), (0x01, 0x00), (0x03, 0xFF), (0xFF, 0xFF)] {
        let reading = decode(&frame(hi, lo, lo, hi)).unwrap();
        let raw1 = f64::from(hi) * 256.0 + f64::from(lo);
        let raw2 = f64::from(lo) * 256.0 + f64::from(hi);
        assert!((reading.ch1 - 3.3 * raw1 / 1024.0).abs() < 1e-9);
        assert!((reading.ch2 - 3.3 * raw2 / 1024.0).abs() < 1e-9);
    }
}

#[test]
fn test_decode_rejects_malformed_frames() {
    assert_eq!(
        decode(&frame(0, 0, 0, 0)[..10]),
        Err(FormatError::InvalidLength {
            expected: 12,
            got: 10
        })
    );

    let mut bad = [0u8; 12];
    bad[1] = MARKER;
    assert!(matches!(
        decode(&bad),
        Err(FormatError::MissingMarker { got: [0x00, MARKER] })
    ));
}

// ============================================================================
// Resynchronization
// ============================================================================

#[test]
fn test_two_garbage_bytes_then_packet() {
    let packet = Packet::from_raw(512, 77);
    let mut stream = vec![0x00, 0x00];
    stream.extend_from_slice(packet.as_bytes());

    let mut framer = Resynchronizer::new();
    let mut emitted = Vec::new();
    let outcome = framer.feed(&stream, |p| emitted.push(p));

    assert_eq!(emitted, vec![packet]);
    assert_eq!(outcome.discarded, 2);
    assert_eq!(framer.pending(), 0);
}

#[test]
fn test_split_feed_matches_whole_feed_at_every_boundary() {
    let packet = Packet::from_raw(0x0123, 0x03FF);
    let whole = Resynchronizer::new().feed_collect(packet.as_bytes());
    assert_eq!(whole, vec![packet]);

    for split in 0..=packet.as_bytes().len() {
        let (head, tail) = packet.as_bytes().split_at(split);
        let mut framer = Resynchronizer::new();
        let mut emitted = framer.feed_collect(head);
        emitted.extend(framer.feed_collect(tail));
        assert_eq!(emitted, whole, "split at {split}");
    }
}

#[test]
fn test_interleaved_noise_keeps_order() {
    let a = Packet::from_raw(1, 2);
    let b = Packet::from_raw(1000, 20);

    for noise_len in [0usize, 1, 5, 11, 12, 40] {
        let mut stream = noise(noise_len, 3);
        stream.extend_from_slice(a.as_bytes());
        stream.extend(noise(noise_len, 9));
        stream.extend_from_slice(b.as_bytes());

        let emitted = Resynchronizer::new().feed_collect(&stream);
        assert_eq!(emitted, vec![a, b], "noise length {noise_len}");
    }
}

#[test]
fn test_byte_at_a_time_stream() {
    let packets: Vec<Packet> = (0..20u16).map(|i| Packet::from_raw(i * 50, 1023 - i)).collect();
    let mut stream = noise(7, 1);
    for packet in &packets {
        stream.extend_from_slice(packet.as_bytes());
    }

    let mut framer = Resynchronizer::new();
    let mut emitted = Vec::new();
    for byte in stream {
        framer.feed(&[byte], |p| emitted.push(p));
    }
    assert_eq!(emitted, packets);
    assert_eq!(framer.stats().bytes_discarded, 7);
}

#[test]
fn test_embedded_marker_waits_for_full_packet() {
    let mut framer = Resynchronizer::new();

    // marker pair followed by only 5 more bytes
    let run = [0x01, MARKER, MARKER, 0x10, 0x11, 0x12, 0x13, 0x14];
    assert!(framer.feed_collect(&run).is_empty());

    // four more bytes: the 0x01 is dropped but the marker run is still short
    assert!(framer.feed_collect(&[0x20, 0x21, 0x22, 0x23]).is_empty());
    assert_eq!(framer.pending(), 11);

    // twelfth byte at the marker position completes a candidate packet
    let emitted = framer.feed_collect(&[0x24]);
    assert_eq!(emitted.len(), 1);
    assert_eq!(
        emitted[0].as_bytes(),
        &[MARKER, MARKER, 0x10, 0x11, 0x12, 0x13, 0x14, 0x20, 0x21, 0x22, 0x23, 0x24]
    );
}

// ============================================================================
// Framer + codec
// ============================================================================

#[test]
fn test_stream_decodes_with_custom_scale() {
    let codec = PacketCodec::new(ScaleConfig {
        vref: 5.0,
        vmax: 4096.0,
    });
    let mut stream = noise(3, 4);
    stream.extend_from_slice(Packet::from_raw(2048, 4095).as_bytes());

    let readings: Vec<Reading> = Resynchronizer::new()
        .feed_collect(&stream)
        .iter()
        .map(|p| codec.decode_packet(p))
        .collect();
    assert_eq!(readings.len(), 1);
    assert!((readings[0].ch1 - 2.5).abs() < 1e-12);
    assert!((readings[0].ch2 - 5.0 * 4095.0 / 4096.0).abs() < 1e-12);
}
