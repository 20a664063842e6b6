//! Packed bitfield access and the sensor-tag CRC

/// Taps of the sensor CRC register: bits 12, 5 and the feedback into bit 0
const CRC_TAPS: u16 = (1 << 12) | (1 << 5) | 1;

/// Extract `bit_length` bits starting `bit_offset` bits after the most-significant
/// bit of `bytes`, read as one big-endian integer.
///
/// Returns `None` if the window does not fit in the buffer or is wider than 64 bits.
pub fn pack_bits(bytes: &[u8], bit_offset: usize, bit_length: usize) -> Option<u64> {
    if bit_length > 64 || bit_offset + bit_length > bytes.len() * 8 {
        return None;
    }

    let mut value = 0u64;
    for bit in bit_offset..bit_offset + bit_length {
        let byte = bytes[bit / 8];
        let set = (byte >> (7 - bit % 8)) & 1;
        value = (value << 1) | set as u64;
    }
    Some(value)
}

/// Write the low `bit_length` bits of `value` at `bit_offset` (counted from the MSB).
///
/// Returns `false` and leaves `bytes` untouched if the window does not fit.
pub fn write_bits(bytes: &mut [u8], bit_offset: usize, bit_length: usize, value: u64) -> bool {
    if bit_length > 64 || bit_offset + bit_length > bytes.len() * 8 {
        return false;
    }

    for i in 0..bit_length {
        let bit = bit_offset + i;
        let set = (value >> (bit_length - 1 - i)) & 1 == 1;
        let mask = 1u8 << (7 - bit % 8);
        if set {
            bytes[bit / 8] |= mask;
        } else {
            bytes[bit / 8] &= !mask;
        }
    }
    true
}

/// CRC used by temperature sensor tags to protect their calibration block.
///
/// The buffer is consumed from its last byte to its first, each byte MSB first.
/// The register starts at all ones and is complemented at the end.
pub fn sensor_crc16(bytes: &[u8]) -> u16 {
    let mut register: u16 = 0xFFFF;

    for &byte in bytes.iter().rev() {
        for shift in (0..8).rev() {
            let input = u16::from((byte >> shift) & 1);
            let feedback = (register >> 15) ^ input;
            register <<= 1;
            if feedback == 1 {
                register ^= CRC_TAPS;
            }
        }
    }

    !register
}
