//! # Packet Encoder
//!
//! Builds complete wire frames from a header and payload.
//!
//! ```text
//! 0x0A 0x55 | data_type length | payload (LE) | crc16 (LE)
//! ```
//!
//! The CRC covers header and payload, computed over the header first and
//! continued over the payload.

use bytes::{BufMut, Bytes, BytesMut};

use super::crc::crc16;
use super::payload::Payload;
use super::protocol::*;
use crate::error::{LinkError, Result};

/// Encode a frame from an explicit header
///
/// # Errors
///
/// Returns `LinkError::Encode` if the header disagrees with the payload's
/// data type or size.
pub fn encode(header: &Header, payload: &Payload) -> Result<Bytes> {
    if header.data_type != payload.data_type() {
        return Err(LinkError::Encode(format!(
            "header type {:?} does not match payload type {:?}",
            header.data_type,
            payload.data_type()
        )));
    }

    if header.length != payload.size() {
        return Err(LinkError::Encode(format!(
            "header length {} does not match {:?} payload size {}",
            header.length,
            payload.data_type(),
            payload.size()
        )));
    }

    Ok(build_frame(header, payload))
}

/// Encode a frame, deriving the header from the payload
///
/// # Examples
///
/// ```
/// use codrone_link::packet::encoder::encode_payload;
/// use codrone_link::packet::payload::Control;
///
/// let frame = encode_payload(&Control::new(10, -5, 0, 50).into());
/// assert_eq!(&frame[..8], &[0x0A, 0x55, 0x10, 0x04, 0x0A, 0xFB, 0x00, 0x32]);
/// ```
pub fn encode_payload(payload: &Payload) -> Bytes {
    build_frame(&Header::for_payload(payload), payload)
}

fn build_frame(header: &Header, payload: &Payload) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_OVERHEAD + header.length as usize);
    frame.put_u8(SYNC_BYTE_1);
    frame.put_u8(SYNC_BYTE_2);
    frame.put_slice(&header.to_bytes());
    payload.encode_into(&mut frame);

    let body_start = 2 + HEADER_SIZE;
    let crc = crc16(&frame[body_start..], crc16(&frame[2..body_start], 0));
    frame.put_u16_le(crc);

    frame.freeze()
}
