//! # Packet Module
//!
//! Implementation of the CoDrone / Petrone serial packet protocol.
//!
//! This module handles:
//! - Frame encoding (sync bytes, header, little-endian payload, CRC16)
//! - Stream decoding with resynchronisation after noise
//! - Typed payload records for every data type
//! - CRC-16/XMODEM checksum calculation

pub mod protocol;
pub mod payload;
pub mod encoder;
pub mod decoder;
pub mod crc;
