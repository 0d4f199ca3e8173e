//! The `Get<T>` trait and its implementations provide a single generic `get<T>()` for the
//! value types stored in the record store.

use crate::error::Error;
use crate::fds::FlashLog;
use crate::{RecordStore, SectionCatalog};
use alloc::vec::Vec;

pub trait Get<T> {
    fn get(&mut self, index: u16) -> Result<T, Error>;
}

impl<T, G: Get<T>> Get<T> for &mut G {
    fn get(&mut self, index: u16) -> Result<T, Error> {
        (*self).get(index)
    }
}

impl<L: FlashLog, C: SectionCatalog> RecordStore<L, C> {
    fn get_word(&mut self, index: u16) -> Result<[u8; 4], Error> {
        let bytes = self.get_one_record(index)?;
        bytes.try_into().map_err(|_| Error::Setup)
    }
}

impl<L: FlashLog, C: SectionCatalog> Get<f32> for RecordStore<L, C> {
    fn get(&mut self, index: u16) -> Result<f32, Error> {
        Ok(f32::from_le_bytes(self.get_word(index)?))
    }
}

impl<L: FlashLog, C: SectionCatalog> Get<u32> for RecordStore<L, C> {
    fn get(&mut self, index: u16) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.get_word(index)?))
    }
}

impl<L: FlashLog, C: SectionCatalog> Get<i32> for RecordStore<L, C> {
    fn get(&mut self, index: u16) -> Result<i32, Error> {
        Ok(i32::from_le_bytes(self.get_word(index)?))
    }
}

impl<L: FlashLog, C: SectionCatalog> Get<Vec<u8>> for RecordStore<L, C> {
    fn get(&mut self, index: u16) -> Result<Vec<u8>, Error> {
        self.get_one_record(index)
    }
}
