//! SQLite-style variable length integers.
//!
//! Values are stored big-endian in groups of 7 bits, the high bit of each byte
//! marking a continuation. The ninth byte, when present, carries a full 8 bits, so
//! any `u64` fits in at most 9 bytes.

use crate::error::SpillError;
use crate::Result;

/// Maximum encoded length of a varint.
pub const MAX_VARINT_LEN: usize = 9;

/// Encodes `value` into the front of `buf` and returns the number of bytes used.
/// `buf` must hold at least [`MAX_VARINT_LEN`] bytes.
pub fn write_varint(buf: &mut [u8], value: u64) -> usize {
    if value <= 0x7f {
        buf[0] = (value & 0x7f) as u8;
        return 1;
    }

    if value <= 0x3fff {
        buf[0] = (((value >> 7) & 0x7f) | 0x80) as u8;
        buf[1] = (value & 0x7f) as u8;
        return 2;
    }

    let mut value = value;
    if (value & ((0xff00_0000_u64) << 32)) > 0 {
        buf[8] = value as u8;
        value >>= 8;
        for byte in buf[..8].iter_mut().rev() {
            *byte = ((value & 0x7f) | 0x80) as u8;
            value >>= 7;
        }
        return 9;
    }

    let mut encoded: [u8; 10] = [0; 10];
    let mut bytes = value;
    let mut n = 0;
    while bytes != 0 {
        let v = 0x80 | (bytes & 0x7f);
        encoded[n] = v as u8;
        bytes >>= 7;
        n += 1;
    }
    encoded[0] &= 0x7f;
    for (dst, src) in buf.iter_mut().zip(encoded[..n].iter().rev()) {
        *dst = *src;
    }
    n
}

/// Appends the encoding of `value` to `out`.
pub fn append_varint(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = write_varint(&mut buf, value);
    out.extend_from_slice(&buf[..len]);
}

/// Decodes a varint from the front of `buf`, returning the value and the number of
/// bytes consumed.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut v: u64 = 0;
    for i in 0..8 {
        match buf.get(i) {
            Some(c) => {
                v = (v << 7) + (c & 0x7f) as u64;
                if (c & 0x80) == 0 {
                    return Ok((v, i + 1));
                }
            }
            None => {
                return Err(SpillError::Corrupt("Invalid varint".into()));
            }
        }
    }
    match buf.get(8) {
        Some(&c) => {
            v = (v << 8) + c as u64;
            Ok((v, 9))
        }
        None => Err(SpillError::Corrupt("Invalid varint".into())),
    }
}

/// Number of bytes [`write_varint`] uses for `value`.
pub fn varint_len(value: u64) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        0x1000_0000..=0x7_ffff_ffff => 5,
        0x8_0000_0000..=0x3ff_ffff_ffff => 6,
        0x400_0000_0000..=0x1_ffff_ffff_ffff => 7,
        0x2_0000_0000_0000..=0xff_ffff_ffff_ffff => 8,
        _ => 9,
    }
}
