//! Partition key derivation.
//!
//! Every gateway and replica must agree on this function bit-for-bit: it decides
//! which partition owns a galaxy. The digest is MD5 over the UTF-16LE encoding of
//! the input, folded into 64 bits by XOR-ing two overlapping little-endian windows
//! (offsets 0 and 7). Changing the offset to 8 moves every galaxy.

/// Byte offset of the second digest window. Overlaps the first window by one byte.
const SECOND_WINDOW_OFFSET: usize = 7;

/// Derives the signed 64-bit partition key for a grouping name.
///
/// Pure and deterministic: the same input yields the same key on every process
/// and platform.
pub fn partition_key(input: &str) -> i64 {
    let digest = md5::compute(utf16_le_bytes(input));
    let bytes: &[u8; 16] = &digest.0;

    let first = read_i64_le(bytes, 0);
    let second = read_i64_le(bytes, SECOND_WINDOW_OFFSET);

    first ^ second
}

fn utf16_le_bytes(input: &str) -> Vec<u8> {
    input
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

fn read_i64_le(bytes: &[u8; 16], offset: usize) -> i64 {
    let mut window = [0u8; 8];
    window.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(window)
}
