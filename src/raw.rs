//! On-flash layout of the [`crate::NorFlashLog`].
//!
//! The partition is split into virtual pages of [`PAGE_WORDS`] words. Each page starts with a
//! two word tag followed by records appended back to back. A record is a four word header and
//! its payload:
//!
//! | word | content                              |
//! |------|--------------------------------------|
//! | 0    | `record_key \| length_words << 16`   |
//! | 1    | `file_id \| 0xFFFF << 16`            |
//! | 2    | `record_id`                          |
//! | 3    | CRC-32 over length, words 1, 2, data |
//!
//! Word 0 is programmed first so the space is claimed even if the write is torn. Deleting a
//! record programs word 0 again with the key cleared.

use crate::codec;
use crate::platform::Platform;
use alloc::vec;
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::trace;

pub(crate) const WORD_SIZE: usize = 4;
pub(crate) const PAGE_WORDS: usize = 1024;
pub(crate) const PAGE_SIZE: usize = PAGE_WORDS * WORD_SIZE;

pub(crate) const PAGE_TAG_WORDS: usize = 2;
pub(crate) const PAGE_MAGIC: u32 = 0xDEAD_C0DE;
pub(crate) const PAGE_TYPE_DATA: u32 = 0xF11E_01FF;
// promoted to PAGE_TYPE_DATA by clearing a single bit
pub(crate) const PAGE_TYPE_SWAP: u32 = 0xF11E_03FF;

pub(crate) const HEADER_WORDS: usize = 4;
pub(crate) const MAX_RECORD_WORDS: usize = PAGE_WORDS - PAGE_TAG_WORDS - HEADER_WORDS;

pub(crate) const BLANK: u32 = u32::MAX;
pub(crate) const KEY_DELETED: u16 = 0x0000;

const _: () = assert!(PAGE_TYPE_SWAP & PAGE_TYPE_DATA == PAGE_TYPE_DATA);

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum PageTag {
    Data,
    Swap,
    Blank,
    Invalid,
}

impl PageTag {
    pub(crate) fn parse(words: [u32; PAGE_TAG_WORDS]) -> Self {
        match words {
            [PAGE_MAGIC, PAGE_TYPE_DATA] => PageTag::Data,
            [PAGE_MAGIC, PAGE_TYPE_SWAP] => PageTag::Swap,
            [BLANK, BLANK] => PageTag::Blank,
            _ => PageTag::Invalid,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) struct RecordHeader {
    pub(crate) key: u16,
    pub(crate) len_words: u16,
    pub(crate) file_id: u16,
    pub(crate) record_id: u32,
    pub(crate) crc: u32,
}

impl RecordHeader {
    pub(crate) fn new<T: Platform>(file_id: u16, key: u16, record_id: u32, data: &[u32]) -> Self {
        let mut header = Self {
            key,
            len_words: data.len() as u16,
            file_id,
            record_id,
            crc: 0,
        };
        header.crc = header.compute_crc::<T>(data);
        header
    }

    pub(crate) fn from_words(words: [u32; HEADER_WORDS]) -> Self {
        Self {
            key: words[0] as u16,
            len_words: (words[0] >> 16) as u16,
            file_id: words[1] as u16,
            record_id: words[2],
            crc: words[3],
        }
    }

    pub(crate) fn to_words(&self) -> [u32; HEADER_WORDS] {
        [
            self.key as u32 | (self.len_words as u32) << 16,
            self.file_id as u32 | 0xFFFF << 16,
            self.record_id,
            self.crc,
        ]
    }

    /// First header word with the key cleared.
    pub(crate) fn deleted_word(&self) -> u32 {
        (KEY_DELETED as u32) | (self.len_words as u32) << 16
    }

    /// Header and payload.
    pub(crate) fn total_words(&self) -> usize {
        HEADER_WORDS + self.len_words as usize
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.key == KEY_DELETED
    }

    pub(crate) fn crc_matches<T: Platform>(&self, data: &[u32]) -> bool {
        self.compute_crc::<T>(data) == self.crc
    }

    fn compute_crc<T: Platform>(&self, data: &[u32]) -> u32 {
        let words = self.to_words();
        let mut crc = T::crc32(0, &(self.len_words as u32).to_le_bytes());
        crc = T::crc32(crc, &words[1].to_le_bytes());
        crc = T::crc32(crc, &words[2].to_le_bytes());
        T::crc32(crc, &words_as_bytes(data))
    }
}

pub(crate) fn words_as_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

pub(crate) fn read_words<T: Platform>(
    hal: &mut T,
    offset: u32,
    count: usize,
) -> Result<Vec<u32>, T::Error> {
    let mut buf = vec![0u8; count * WORD_SIZE];
    if !buf.is_empty() {
        hal.read(offset, &mut buf)?;
    }
    Ok(codec::bytes_to_words(&buf))
}

pub(crate) fn write_words<T: Platform>(
    hal: &mut T,
    offset: u32,
    words: &[u32],
) -> Result<(), T::Error> {
    #[cfg(feature = "defmt")]
    trace!("write_words @{:#x}: [{}]", offset, words.len());

    if words.is_empty() {
        return Ok(());
    }
    hal.write(offset, &words_as_bytes(words))
}
