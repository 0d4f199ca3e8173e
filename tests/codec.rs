use fds_store::codec::{bytes_to_words, word_count, words_to_bytes};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

proptest! {
    #[test]
    fn bytes_survive_packing(bytes in proptest::collection::vec(any::<u8>(), 0..=255)) {
        let words = bytes_to_words(&bytes);
        prop_assert_eq!(words.len(), word_count(bytes.len()));
        prop_assert_eq!(words_to_bytes(bytes.len(), &words), Some(bytes));
    }

    #[test]
    fn unused_high_bytes_are_zero(bytes in proptest::collection::vec(any::<u8>(), 1..=255)) {
        let words = bytes_to_words(&bytes);
        let residue = bytes.len() % 4;
        if residue != 0 {
            let last = *words.last().unwrap();
            prop_assert_eq!(last >> (8 * residue), 0);
        }
    }
}

#[test]
fn tagged_float_packs_like_the_firmware() {
    // tag byte followed by 7.7585f32
    let mut bytes = vec![0xAA];
    bytes.extend_from_slice(&7.7585f32.to_le_bytes());

    assert_eq!(bytes_to_words(&bytes), vec![0xF845_A2AA, 0x0000_0040]);
}
