//! Compact integer and string encodings used inside the cache files
//!
//! ```text
//! INT:  b0 < 192            -> value = b0
//!       b0 >= 192           -> value = (b0 - 192) | b1<<6 | b2<<13 | b3<<20 | b4<<27
//!                              bi has bit 7 set while more bytes follow
//! UTF:  n != 0xFF           -> n ASCII bytes follow
//!       n == 0xFF           -> u16 BE length, then that many UTF-8 bytes
//! ```
//!
//! Negative `i32` values are written as their two's complement bit pattern,
//! so the same INT encoding carries signed deltas.

use bytes::{Buf, BufMut};
use vfscache_common::{Error, Result};

/// First-byte values below this are the value itself
const INLINE_LIMIT: u8 = 192;

/// Shift of the last continuation byte an `i32` can need
const MAX_SHIFT: u32 = 27;

/// Marker byte for the long string form
const LONG_UTF_MARKER: u8 = 0xFF;

fn next_byte(buf: &mut impl Buf, what: &str) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(Error::corrupt(format!("truncated {what}")));
    }
    Ok(buf.get_u8())
}

/// Read one INT-encoded value
pub fn read_int(buf: &mut impl Buf) -> Result<i32> {
    let first = next_byte(buf, "varint")?;
    if first < INLINE_LIMIT {
        return Ok(i32::from(first));
    }

    let mut value = u32::from(first - INLINE_LIMIT);
    let mut shift = 6;
    loop {
        let next = next_byte(buf, "varint")?;
        value |= u32::from(next & 0x7F) << shift;
        if next & 0x80 == 0 {
            return Ok(value as i32);
        }
        if shift >= MAX_SHIFT {
            return Err(Error::corrupt("varint longer than 32 bits"));
        }
        shift += 7;
    }
}

/// Write one INT-encoded value
pub fn write_int(buf: &mut impl BufMut, value: i32) {
    if (0..i32::from(INLINE_LIMIT)).contains(&value) {
        buf.put_u8(value as u8);
        return;
    }

    let mut bits = value as u32;
    buf.put_u8(INLINE_LIMIT + (bits & 0x3F) as u8);
    bits >>= 6;
    while bits >= 0x80 {
        buf.put_u8((bits & 0x7F) as u8 | 0x80);
        bits >>= 7;
    }
    buf.put_u8(bits as u8);
}

/// Read one length-prefixed string
pub fn read_utf(buf: &mut impl Buf) -> Result<String> {
    let first = next_byte(buf, "string length")?;
    let len = if first == LONG_UTF_MARKER {
        if buf.remaining() < 2 {
            return Err(Error::corrupt("truncated string length"));
        }
        usize::from(buf.get_u16())
    } else {
        usize::from(first)
    };

    if buf.remaining() < len {
        return Err(Error::corrupt(format!(
            "string of {len} bytes overruns {} remaining",
            buf.remaining()
        )));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|e| Error::corrupt(format!("invalid UTF-8 in string: {e}")))
}

/// Write one length-prefixed string
///
/// Strings longer than `u16::MAX` bytes cannot be represented and are truncated
/// at the last character boundary that fits.
pub fn write_utf(buf: &mut impl BufMut, value: &str) {
    if value.is_ascii() && value.len() < usize::from(LONG_UTF_MARKER) {
        buf.put_u8(value.len() as u8);
        buf.put_slice(value.as_bytes());
        return;
    }

    let mut end = value.len().min(usize::from(u16::MAX));
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_u8(LONG_UTF_MARKER);
    buf.put_u16(end as u16);
    buf.put_slice(&value.as_bytes()[..end]);
}
