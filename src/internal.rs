use crate::catalog::record_key;
use crate::error::Error;
use crate::fds::{FdsError, FlashLog};
use crate::{RecordStore, SectionCatalog, codec};
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

impl<L, C> RecordStore<L, C>
where
    L: FlashLog,
    C: SectionCatalog,
{
    /// Creates the record if it does not exist yet and replaces it otherwise. A failed write
    /// or update is retried once after a garbage collection.
    pub(crate) fn set_byte_array(
        &mut self,
        file_id: u16,
        index: u16,
        bytes: &[u8],
    ) -> Result<(), Error> {
        let words = codec::bytes_to_words(bytes);
        self.driver
            .configure_record(file_id, record_key(index), &words)
            .map_err(|_| Error::Setup)?;

        match self.driver.find() {
            Err(FdsError::NotFound) => self.store_with_retry(index, |driver| driver.write()),
            Ok(()) => self.store_with_retry(index, |driver| driver.update()),
            Err(e) => {
                #[cfg(feature = "defmt")]
                warn!("set: lookup of index {} failed: {}", index, e);

                Err(Error::Lookup(e))
            }
        }
    }

    #[cfg_attr(
        not(any(feature = "defmt", feature = "debug-logs")),
        allow(unused_variables)
    )]
    fn store_with_retry(
        &mut self,
        index: u16,
        store: impl Fn(&mut crate::FlashLogDriver<L>) -> Result<(), FdsError>,
    ) -> Result<(), Error> {
        let Err(e) = store(&mut self.driver) else {
            return Ok(());
        };

        #[cfg(feature = "defmt")]
        warn!(
            "set: index {} failed with {}, collecting garbage",
            index, e
        );

        #[cfg(feature = "debug-logs")]
        println!("store: index {index} failed with {e:?}, collecting garbage");

        self.driver
            .garbage_collect()
            .map_err(Error::GarbageCollection)?;

        store(&mut self.driver).map_err(|e| {
            #[cfg(feature = "defmt")]
            warn!("set: index {} failed again: {}", index, e);

            Error::Write(e)
        })
    }

    /// Reads `byte_len` bytes of the record of `index`.
    pub(crate) fn get_byte_array(
        &mut self,
        file_id: u16,
        index: u16,
        byte_len: usize,
    ) -> Result<Vec<u8>, Error> {
        self.driver
            .configure_record(file_id, record_key(index), &[])
            .map_err(|_| Error::Setup)?;

        let mut words = Vec::with_capacity(codec::word_count(byte_len));
        self.driver.read(&mut words).map_err(|e| match e {
            FdsError::NotFound => Error::NotFound,
            e => Error::Read(e),
        })?;

        // a record shorter than its declared size cannot be decoded
        codec::words_to_bytes(byte_len, &words).ok_or(Error::Read(FdsError::Internal))
    }

    pub(crate) fn del_byte_array(&mut self, file_id: u16, index: u16) -> Result<(), Error> {
        self.driver
            .configure_record(file_id, record_key(index), &[])
            .map_err(|_| Error::Setup)?;

        self.driver.delete().map_err(|e| match e {
            FdsError::NotFound => Error::NotFound,
            e => Error::Delete(e),
        })
    }

    /// Writes `payload` prefixed by `tag`.
    pub(crate) fn set_one_byte_array_data(
        &mut self,
        file_id: u16,
        index: u16,
        tag: u8,
        payload: &[u8],
    ) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(payload.len() + 1);
        bytes.push(tag);
        bytes.extend_from_slice(payload);

        #[cfg(feature = "defmt")]
        trace!("set: index {} tag {:#x}: {} bytes", index, tag, payload.len());

        #[cfg(feature = "debug-logs")]
        println!("store: set index {index} tag {tag:#04x}: {payload:02x?}");

        self.set_byte_array(file_id, index, &bytes)
    }

    /// Reads a tagged record of `payload_len` bytes and splits off the tag.
    pub(crate) fn get_one_byte_array_data(
        &mut self,
        file_id: u16,
        index: u16,
        payload_len: usize,
    ) -> Result<(u8, Vec<u8>), Error> {
        let mut bytes = self.get_byte_array(file_id, index, payload_len + 1)?;
        let tag = bytes.remove(0);

        #[cfg(feature = "debug-logs")]
        println!("store: get index {index} tag {tag:#04x}: {bytes:02x?}");

        Ok((tag, bytes))
    }
}
