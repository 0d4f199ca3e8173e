use embedded_storage::nor_flash::MultiwriteNorFlash;

/// Flash the [`crate::NorFlashLog`] can run on. See README.md for an example implementation.
///
/// Deleting a record and promoting the swap page program words a second time, clearing more
/// bits, so the flash has to allow multiple writes per word.
pub trait Platform: Crc + MultiwriteNorFlash {}

impl<T: Crc + MultiwriteNorFlash> Platform for T {}

/// CRC-32 (IEEE 802.3, reflected) continuing from `init`, as computed by zlib's `crc32()`.
pub trait Crc {
    fn crc32(init: u32, data: &[u8]) -> u32;
}

/// [`Crc::crc32`] for targets without a hardware or ROM implementation.
pub fn crc32_ieee(init: u32, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(init);
    hasher.update(data);
    hasher.finalize()
}

pub trait AlignedOps: Platform {
    fn align_read(size: usize) -> usize {
        align_ceil(size, Self::READ_SIZE)
    }

    fn align_write_ceil(size: usize) -> usize {
        align_ceil(size, Self::WRITE_SIZE)
    }
}

#[inline(always)]
const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

impl<T: Platform> AlignedOps for T {}

#[cfg(any(feature = "nrf52832", feature = "nrf52840"))]
impl Crc for embassy_nrf::nvmc::Nvmc<'_> {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        crc32_ieee(init, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32_ieee(0, b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32_ieee(0, &[]), 0);
    }

    #[test]
    fn crc32_continues_from_init() {
        let whole = crc32_ieee(0, b"hello world");
        let split = crc32_ieee(crc32_ieee(0, b"hello "), b"world");
        assert_eq!(whole, split);
    }

    #[test]
    fn alignment() {
        assert_eq!(align_ceil(0, 4), 0);
        assert_eq!(align_ceil(5, 4), 8);
        assert_eq!(align_ceil(8, 4), 8);
        assert_eq!(align_ceil(7, 3), 9);
    }
}
