use crate::error::Error;
use crate::fds::FlashLog;
use crate::{RecordStore, SectionCatalog};

pub trait Set<T> {
    fn set(&mut self, index: u16, value: T) -> Result<(), Error>;
}

impl<T, S: Set<T>> Set<T> for &mut S {
    fn set(&mut self, index: u16, value: T) -> Result<(), Error> {
        (*self).set(index, value)
    }
}

impl<L: FlashLog, C: SectionCatalog> Set<f32> for RecordStore<L, C> {
    fn set(&mut self, index: u16, value: f32) -> Result<(), Error> {
        self.set_one_record(index, &value.to_le_bytes())
    }
}

impl<L: FlashLog, C: SectionCatalog> Set<u32> for RecordStore<L, C> {
    fn set(&mut self, index: u16, value: u32) -> Result<(), Error> {
        self.set_one_record(index, &value.to_le_bytes())
    }
}

impl<L: FlashLog, C: SectionCatalog> Set<i32> for RecordStore<L, C> {
    fn set(&mut self, index: u16, value: i32) -> Result<(), Error> {
        self.set_one_record(index, &value.to_le_bytes())
    }
}

impl<L: FlashLog, C: SectionCatalog> Set<&[u8]> for RecordStore<L, C> {
    fn set(&mut self, index: u16, value: &[u8]) -> Result<(), Error> {
        self.set_one_record(index, value)
    }
}
