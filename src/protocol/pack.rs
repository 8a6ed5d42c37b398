//! Argument packing for command payloads
//!
//! Every multi-byte argument goes out big-endian. Values wider than the
//! requested width are truncated to their low bytes, the way the firmware
//! tolerates oversized inputs.

/// Big-endian bytes of `value`, truncated to `width` bytes.
///
/// Widths past eight bytes are left-padded with zeros.
#[must_use]
pub fn int_to_bytes(value: u64, width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width);
    put_int(&mut out, value, width);
    out
}

/// Append big-endian bytes of `value`, truncated to `width` bytes.
pub fn put_int(out: &mut Vec<u8>, value: u64, width: usize) {
    for i in (0..width).rev() {
        let shift = u32::try_from(i * 8).unwrap_or(u32::MAX);
        out.push(value.checked_shr(shift).unwrap_or(0) as u8);
    }
}

/// OR together `(value, mask)` pairs, each value masked first.
#[must_use]
pub fn pack_flags(bits: &[(u8, u8)]) -> u8 {
    bits.iter().fold(0, |acc, (value, mask)| acc | (value & mask))
}

/// One-byte boolean as the firmware expects it
#[must_use]
pub const fn flag(value: bool) -> u8 {
    if value { 0x01 } else { 0x00 }
}

/// Split a packed `0xRRGGBB` color into its channel bytes
#[must_use]
pub const fn rgb(color: u32) -> [u8; 3] {
    [(color >> 16) as u8, (color >> 8) as u8, color as u8]
}
