//! ## Endianness Module
//! Helpers to move unsigned words and bit fields in and out of little-endian byte buffers.
//!
//! Register maps store every word least significant byte first. All helpers here operate on
//! at most 64 bits at a time; wider strides are zero padded.

/// Mask with the lowest `bits` bits set.
#[inline(always)]
pub const fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Serialize `value` into `out` least significant byte first.
///
/// Bytes of `out` beyond the eighth are zeroed.
pub fn write_le(value: u64, out: &mut [u8]) {
    let bytes = value.to_le_bytes();
    for (idx, byte) in out.iter_mut().enumerate() {
        *byte = if idx < bytes.len() { bytes[idx] } else { 0 };
    }
}

/// Parse at most the first eight bytes of `data` as a little-endian word.
pub fn read_le(data: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let len = data.len().min(8);
    bytes[..len].copy_from_slice(&data[..len]);
    u64::from_le_bytes(bytes)
}

/// Extract a `bit_size` wide field starting at bit `bit_offset` of `data`.
///
/// Bits that fall outside `data` read as zero.
pub fn get_bits(data: &[u8], bit_offset: usize, bit_size: u32) -> u64 {
    let mut value = 0u64;
    for i in 0..bit_size as usize {
        let bit = bit_offset + i;
        let byte = bit / 8;
        if byte >= data.len() {
            break;
        }
        if data[byte] & (1 << (bit % 8)) != 0 {
            value |= 1 << i;
        }
    }
    value
}

/// Insert the lowest `bit_size` bits of `value` at bit `bit_offset` of `data`.
///
/// Bits that would fall outside `data` are dropped.
pub fn set_bits(data: &mut [u8], bit_offset: usize, bit_size: u32, value: u64) {
    for i in 0..bit_size as usize {
        let bit = bit_offset + i;
        let byte = bit / 8;
        if byte >= data.len() {
            break;
        }
        if value & (1 << i) != 0 {
            data[byte] |= 1 << (bit % 8);
        } else {
            data[byte] &= !(1 << (bit % 8));
        }
    }
}

/// Sign extend the lowest `bits` bits of `value`.
pub const fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}
