//! # CRC16 Implementation
//!
//! CRC-16/XMODEM checksum used to protect every frame.
//!
//! **Polynomial**: 0x1021 (x^16 + x^12 + x^5 + 1)
//! **Initial Value**: 0x0000 (passed in as the seed)
//!
//! The checksum is a running accumulator: the result of one call can be fed
//! back as the seed of the next, so header and payload may be checksummed
//! separately.

/// CRC-16/XMODEM polynomial
const CRC16_POLY: u16 = 0x1021;

/// Precomputed CRC16 lookup table for fast calculation
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate CRC16 over `data`, continuing from `seed`
///
/// # Arguments
///
/// * `data` - Bytes to checksum
/// * `seed` - Accumulator from a previous call, or `0` to start
///
/// # Examples
///
/// ```
/// use codrone_link::packet::crc::crc16;
///
/// let header = [0x10, 0x04];
/// let payload = [0x0A, 0xFB, 0x00, 0x32];
///
/// let whole = crc16(&[0x10, 0x04, 0x0A, 0xFB, 0x00, 0x32], 0);
/// assert_eq!(whole, crc16(&payload, crc16(&header, 0)));
/// ```
pub fn crc16(data: &[u8], seed: u16) -> u16 {
    let mut crc = seed;

    for &byte in data {
        let index = ((crc >> 8) ^ byte as u16) & 0xFF;
        crc = (crc << 8) ^ CRC16_TABLE[index as usize];
    }

    crc
}

/// Bitwise CRC16, used to check the lookup table
#[allow(dead_code)]
fn crc16_slow(data: &[u8], seed: u16) -> u16 {
    let mut crc = seed;

    for &byte in data {
        crc ^= (byte as u16) << 8;

        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
