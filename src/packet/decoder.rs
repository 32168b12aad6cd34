//! # Frame Decoder
//!
//! Byte-at-a-time state machine turning a raw, possibly corrupted serial
//! stream into validated packets.
//!
//! ```text
//! Sync1 ──0x0A──▶ Sync2 ──0x55──▶ Header(2) ──▶ Payload(length) ──▶ Crc(2)
//!   ▲               │                  │                               │
//!   └── mismatch ───┘        unknown type / bad length      Loaded | Failure
//! ```
//!
//! Noise before a sync sequence is dropped silently. A decoded packet is held
//! in the `Loaded` state until [`FrameDecoder::checked`] is called, so the
//! consumer always sees it before the next frame can overwrite it.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use super::crc::crc16;
use super::payload::Payload;
use super::protocol::*;
use crate::error::{LinkError, Result};

/// Default gap between two bytes of one frame before the frame is abandoned
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(600);

/// Why a frame was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unknown data type 0x{0:02X}")]
    UnknownType(u8),

    #[error("Length mismatch for {data_type:?}: got {declared} bytes, expected {expected}")]
    LengthMismatch {
        data_type: DataType,
        declared: usize,
        expected: u8,
    },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{received:04X}")]
    Checksum { expected: u16, received: u16 },

    #[error("Invalid {field} value 0x{value:02X} in {data_type:?}")]
    InvalidField {
        data_type: DataType,
        field: &'static str,
        value: u8,
    },

    #[error("Frame incomplete after {0} bytes")]
    Incomplete(usize),
}

/// Outcome of feeding one byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Waiting for a sync sequence
    Idle,
    /// Inside a frame
    Accumulating,
    /// A packet is ready; call `checked()` to continue
    Loaded,
    /// The current frame was rejected; the next byte starts a new search
    Failure(DecodeError),
}

/// A validated packet
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub header: Header,
    pub payload: Payload,
    pub received_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Sync1,
    Sync2,
    Header,
    Payload,
    Crc,
}

/// Stream decoder state
#[derive(Debug)]
pub struct FrameDecoder {
    section: Section,
    status: DecodeStatus,
    /// Header, payload and CRC bytes of the current frame
    buffer: Vec<u8>,
    header: Option<Header>,
    /// Header + payload + CRC, known once the header is read
    expected_len: usize,
    last_byte_at: Option<Instant>,
    frame_timeout: Duration,
    packet: Option<DecodedPacket>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_TIMEOUT)
    }
}

impl FrameDecoder {
    /// Create a decoder that abandons a frame after `frame_timeout` of silence
    pub fn new(frame_timeout: Duration) -> Self {
        Self {
            section: Section::Sync1,
            status: DecodeStatus::Idle,
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
            header: None,
            expected_len: 0,
            last_byte_at: None,
            frame_timeout,
            packet: None,
        }
    }

    /// Current status
    pub fn status(&self) -> &DecodeStatus {
        &self.status
    }

    /// The packet held while `Loaded`
    pub fn packet(&self) -> Option<&DecodedPacket> {
        self.packet.as_ref()
    }

    /// Move the loaded packet out; the decoder stays `Loaded` until `checked()`
    pub fn take_packet(&mut self) -> Option<DecodedPacket> {
        self.packet.take()
    }

    /// Acknowledge a loaded packet and resume scanning
    pub fn checked(&mut self) {
        if self.status == DecodeStatus::Loaded {
            self.reset();
        }
    }

    /// Drop any partial or loaded frame and wait for the next sync sequence
    pub fn reset(&mut self) {
        self.section = Section::Sync1;
        self.status = DecodeStatus::Idle;
        self.buffer.clear();
        self.header = None;
        self.expected_len = 0;
        self.packet = None;
    }

    /// Feed one byte received at `now`
    ///
    /// While `Loaded`, bytes are ignored and `Loaded` is returned until the
    /// packet is acknowledged with [`checked`](Self::checked).
    pub fn feed(&mut self, byte: u8, now: Instant) -> DecodeStatus {
        match self.status {
            DecodeStatus::Loaded => return DecodeStatus::Loaded,
            DecodeStatus::Failure(_) => self.reset(),
            _ => {}
        }

        if self.section != Section::Sync1 {
            if let Some(last) = self.last_byte_at {
                if now.saturating_duration_since(last) > self.frame_timeout {
                    self.reset();
                }
            }
        }
        self.last_byte_at = Some(now);

        match self.section {
            Section::Sync1 => {
                if byte == SYNC_BYTE_1 {
                    self.section = Section::Sync2;
                    self.status = DecodeStatus::Accumulating;
                }
            }
            Section::Sync2 => {
                if byte == SYNC_BYTE_2 {
                    self.section = Section::Header;
                } else if byte != SYNC_BYTE_1 {
                    // A repeated 0x0A may still be the start of the real sync
                    self.reset();
                }
            }
            Section::Header => {
                self.buffer.push(byte);
                if self.buffer.len() == HEADER_SIZE {
                    return self.read_header();
                }
            }
            Section::Payload => {
                self.buffer.push(byte);
                if self.buffer.len() == self.expected_len - CRC_SIZE {
                    self.section = Section::Crc;
                }
            }
            Section::Crc => {
                self.buffer.push(byte);
                if self.buffer.len() == self.expected_len {
                    return self.verify(now);
                }
            }
        }

        self.status.clone()
    }

    fn read_header(&mut self) -> DecodeStatus {
        let data_type = match DataType::try_from(self.buffer[0]) {
            Ok(data_type) => data_type,
            Err(raw) => return self.fail(DecodeError::UnknownType(raw)),
        };

        let length = self.buffer[1];
        let expected = data_type.payload_size();
        if length != expected {
            return self.fail(DecodeError::LengthMismatch {
                data_type,
                declared: length as usize,
                expected,
            });
        }

        self.header = Some(Header { data_type, length });
        self.expected_len = HEADER_SIZE + length as usize + CRC_SIZE;
        self.section = if length == 0 {
            Section::Crc
        } else {
            Section::Payload
        };

        self.status.clone()
    }

    fn verify(&mut self, now: Instant) -> DecodeStatus {
        let Some(header) = self.header else {
            return self.fail(DecodeError::Incomplete(self.buffer.len()));
        };

        let body_end = self.expected_len - CRC_SIZE;
        let received = u16::from_le_bytes([self.buffer[body_end], self.buffer[body_end + 1]]);
        let expected = crc16(
            &self.buffer[HEADER_SIZE..body_end],
            crc16(&self.buffer[..HEADER_SIZE], 0),
        );

        if expected != received {
            return self.fail(DecodeError::Checksum { expected, received });
        }

        match Payload::parse(header.data_type, &self.buffer[HEADER_SIZE..body_end]) {
            Ok(payload) => {
                self.packet = Some(DecodedPacket {
                    header,
                    payload,
                    received_at: now,
                });
                self.status = DecodeStatus::Loaded;
                DecodeStatus::Loaded
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: DecodeError) -> DecodeStatus {
        self.reset();
        self.status = DecodeStatus::Failure(error);
        self.status.clone()
    }
}

/// Decode exactly one complete frame
///
/// # Errors
///
/// Returns error if the frame fails validation or ends before a packet is
/// complete.
///
/// # Examples
///
/// ```
/// use codrone_link::packet::decoder::decode_frame;
/// use codrone_link::packet::encoder::encode_payload;
/// use codrone_link::packet::payload::{Control, Payload};
///
/// let frame = encode_payload(&Control::new(0, 0, 0, 20).into());
/// let packet = decode_frame(&frame).unwrap();
/// assert_eq!(packet.payload, Payload::Control(Control::new(0, 0, 0, 20)));
/// ```
pub fn decode_frame(frame: &[u8]) -> Result<DecodedPacket> {
    let mut decoder = FrameDecoder::default();
    let now = Instant::now();

    for &byte in frame {
        match decoder.feed(byte, now) {
            DecodeStatus::Loaded => {
                return decoder
                    .take_packet()
                    .ok_or(LinkError::Decode(DecodeError::Incomplete(frame.len())));
            }
            DecodeStatus::Failure(e) => return Err(LinkError::Decode(e)),
            _ => {}
        }
    }

    Err(LinkError::Decode(DecodeError::Incomplete(frame.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encoder::encode_payload;
    use crate::packet::payload::{samples, Control, State};

    /// Feed all bytes, acknowledging every packet; returns packets and failures
    fn run(decoder: &mut FrameDecoder, bytes: &[u8]) -> (Vec<DecodedPacket>, Vec<DecodeError>) {
        let now = Instant::now();
        let mut packets = Vec::new();
        let mut failures = Vec::new();

        for &byte in bytes {
            match decoder.feed(byte, now) {
                DecodeStatus::Loaded => {
                    packets.push(decoder.take_packet().unwrap());
                    decoder.checked();
                }
                DecodeStatus::Failure(e) => failures.push(e),
                _ => {}
            }
        }

        (packets, failures)
    }

    /// Deterministic noise that never contains the first sync byte
    fn garbage(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let byte = (state >> 16) as u8;
                if byte == SYNC_BYTE_1 {
                    byte.wrapping_add(1)
                } else {
                    byte
                }
            })
            .collect()
    }

    #[test]
    fn test_round_trip_every_payload() {
        for payload in samples() {
            let frame = encode_payload(&payload);
            let packet = decode_frame(&frame).unwrap();

            assert_eq!(packet.header, Header::new(payload.data_type()));
            assert_eq!(packet.payload, payload);
        }
    }

    #[test]
    fn test_single_corrupted_payload_byte_fails_checksum() {
        for payload in samples() {
            let frame = encode_payload(&payload);
            let payload_range = 4..frame.len() - CRC_SIZE;

            for index in payload_range {
                let mut corrupted = frame.to_vec();
                corrupted[index] ^= 0x01;

                let mut decoder = FrameDecoder::default();
                let (packets, failures) = run(&mut decoder, &corrupted);

                assert!(packets.is_empty(), "corrupted byte {} decoded", index);
                assert!(
                    matches!(failures.as_slice(), [DecodeError::Checksum { .. }]),
                    "expected checksum failure for {:?} byte {}, got {:?}",
                    payload.data_type(),
                    index,
                    failures
                );
            }
        }
    }

    #[test]
    fn test_resync_after_garbage() {
        let frame = encode_payload(&Control::new(1, 2, 3, 4).into());

        for len in [0, 1, 2, 7, 64, 255, 256, 999, 1000] {
            let mut stream = garbage(len, len as u32 + 7);
            stream.extend_from_slice(&frame);

            let mut decoder = FrameDecoder::default();
            let (packets, failures) = run(&mut decoder, &stream);

            assert_eq!(packets.len(), 1, "garbage length {}", len);
            assert!(failures.is_empty());
            assert_eq!(packets[0].payload, Payload::from(Control::new(1, 2, 3, 4)));
        }
    }

    #[test]
    fn test_repeated_first_sync_byte() {
        let frame = encode_payload(&Control::new(0, 0, 0, 0).into());
        let mut stream = vec![SYNC_BYTE_1, SYNC_BYTE_1, SYNC_BYTE_1];
        stream.extend_from_slice(&frame);

        let mut decoder = FrameDecoder::default();
        let (packets, _) = run(&mut decoder, &stream);
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_concatenated_frames() {
        let mut stream = Vec::new();
        for throttle in 0..5 {
            stream.extend_from_slice(&encode_payload(&Control::new(0, 0, 0, throttle).into()));
        }

        let mut decoder = FrameDecoder::default();
        let (packets, failures) = run(&mut decoder, &stream);

        assert!(failures.is_empty());
        let throttles: Vec<i8> = packets
            .iter()
            .map(|p| match p.payload {
                Payload::Control(c) => c.throttle,
                _ => panic!("unexpected payload"),
            })
            .collect();
        assert_eq!(throttles, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_type_then_recovers() {
        let mut stream = vec![SYNC_BYTE_1, SYNC_BYTE_2, 0x99, 0x02, 0x00, 0x00];
        stream.extend_from_slice(&encode_payload(&Control::new(5, 5, 5, 5).into()));

        let mut decoder = FrameDecoder::default();
        let (packets, failures) = run(&mut decoder, &stream);

        assert_eq!(failures, vec![DecodeError::UnknownType(0x99)]);
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_length_mismatch() {
        let stream = [SYNC_BYTE_1, SYNC_BYTE_2, 0x10, 0x09];

        let mut decoder = FrameDecoder::default();
        let (_, failures) = run(&mut decoder, &stream);

        assert_eq!(
            failures,
            vec![DecodeError::LengthMismatch {
                data_type: DataType::Control,
                declared: 9,
                expected: 4,
            }]
        );
    }

    #[test]
    fn test_loaded_holds_until_checked() {
        let first = encode_payload(&Control::new(1, 1, 1, 1).into());
        let second = encode_payload(&Control::new(2, 2, 2, 2).into());
        let now = Instant::now();

        let mut decoder = FrameDecoder::default();
        let mut last = DecodeStatus::Idle;
        for &byte in first.iter() {
            last = decoder.feed(byte, now);
        }
        assert_eq!(last, DecodeStatus::Loaded);

        // Ignored while the first packet is unacknowledged
        for &byte in second.iter() {
            assert_eq!(decoder.feed(byte, now), DecodeStatus::Loaded);
        }
        assert_eq!(
            decoder.packet().map(|p| p.payload.clone()),
            Some(Control::new(1, 1, 1, 1).into())
        );

        decoder.checked();
        assert_eq!(decoder.status(), &DecodeStatus::Idle);
        assert!(decoder.packet().is_none());
    }

    #[test]
    fn test_failure_is_reported_once() {
        let mut frame = encode_payload(&Control::new(1, 1, 1, 1).into()).to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let now = Instant::now();
        let mut decoder = FrameDecoder::default();
        let mut statuses = Vec::new();
        for &byte in frame.iter() {
            statuses.push(decoder.feed(byte, now));
        }

        assert!(matches!(statuses.last(), Some(DecodeStatus::Failure(DecodeError::Checksum { .. }))));
        assert_eq!(decoder.feed(0x00, now), DecodeStatus::Idle);
    }

    #[test]
    fn test_stale_partial_frame_is_dropped() {
        let state = State {
            mode_vehicle: ModeVehicle::FlightGuard,
            mode_system: 0,
            mode_flight: ModeFlight::Ready,
            mode_drive: 0,
            sensor_orientation: SensorOrientation::Normal,
            coordinate: 0,
            battery: 90,
        };
        let frame = encode_payload(&state.into());
        let start = Instant::now();

        let mut decoder = FrameDecoder::new(Duration::from_millis(600));

        // First half arrives, then the line goes quiet
        for &byte in &frame[..6] {
            decoder.feed(byte, start);
        }
        assert_eq!(decoder.status(), &DecodeStatus::Accumulating);

        // A full frame after the timeout decodes on its own
        let later = start + Duration::from_millis(700);
        let mut last = DecodeStatus::Idle;
        for &byte in frame.iter() {
            last = decoder.feed(byte, later);
        }
        assert_eq!(last, DecodeStatus::Loaded);
        assert_eq!(decoder.packet().unwrap().payload, Payload::from(state));
    }

    #[test]
    fn test_split_across_reads() {
        let frame = encode_payload(&Control::new(9, 8, 7, 6).into());
        let mut decoder = FrameDecoder::default();

        let (packets, _) = run(&mut decoder, &frame[..3]);
        assert!(packets.is_empty());
        assert_eq!(decoder.status(), &DecodeStatus::Accumulating);

        let (packets, _) = run(&mut decoder, &frame[3..]);
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_decode_frame_incomplete() {
        let frame = encode_payload(&Control::new(0, 0, 0, 0).into());
        let result = decode_frame(&frame[..frame.len() - 1]);
        assert!(matches!(result, Err(LinkError::Decode(DecodeError::Incomplete(_)))));
    }
}
