//! Conversion between byte payloads and the 32-bit words the flash log writes.
//!
//! Byte `i` always lives in word `i / 4` at bit offset `8 * (i % 4)`. A trailing group of
//! one to three bytes therefore occupies the low bytes of the last word and the unused high
//! bytes are zero. Both directions use this single convention.

use alloc::vec::Vec;

const WORD_SIZE: usize = size_of::<u32>();

/// Number of words required to hold `byte_len` bytes.
pub const fn word_count(byte_len: usize) -> usize {
    byte_len.div_ceil(WORD_SIZE)
}

/// Packs `bytes` into little-endian words.
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    let mut words = Vec::with_capacity(word_count(bytes.len()));

    let mut chunks = bytes.chunks_exact(WORD_SIZE);
    for chunk in &mut chunks {
        words.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    let residue = chunks.remainder();
    if !residue.is_empty() {
        let mut last = [0u8; WORD_SIZE];
        last[..residue.len()].copy_from_slice(residue);
        words.push(u32::from_le_bytes(last));
    }

    words
}

/// Unpacks the first `byte_len` bytes out of `words`.
///
/// Returns `None` if `words` is too short to hold `byte_len` bytes. Extra words are ignored.
pub fn words_to_bytes(byte_len: usize, words: &[u32]) -> Option<Vec<u8>> {
    if words.len() < word_count(byte_len) {
        return None;
    }

    let mut bytes = Vec::with_capacity(byte_len);
    for word in words {
        let remaining = byte_len - bytes.len();
        if remaining == 0 {
            break;
        }
        let le = word.to_le_bytes();
        bytes.extend_from_slice(&le[..remaining.min(WORD_SIZE)]);
    }

    Some(bytes)
}
