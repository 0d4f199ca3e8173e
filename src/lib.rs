#![doc = include_str ! ("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod catalog;
pub mod codec;
pub mod driver;
pub mod error;
pub mod fds;
mod get;
mod internal;
pub mod nor_log;
pub mod platform;
mod raw;
mod set;

pub use catalog::{DefaultCatalog, Section, SectionCatalog};
pub use driver::{BoundedSpin, FlashLogDriver, SleepUntilEvent, WaitStrategy};
pub use error::{Error, RecordStatus};
pub use fds::{FdsError, FlashLog};
pub use get::Get;
pub use nor_log::{NorFlashLog, NorLogStatistics};
pub use set::Set;

extern crate alloc;

use crate::catalog::{FIRST_INDEX, LAST_INDEX, TAG_CHANGED, TAG_DEFAULT};
use alloc::vec::Vec;

/// Maps the logical settings index onto tagged records of a [`FlashLog`].
///
/// The driver must have been initialized with [`FlashLogDriver::init`] before it is handed to
/// the store.
pub struct RecordStore<L: FlashLog, C: SectionCatalog = DefaultCatalog> {
    pub(crate) driver: FlashLogDriver<L>,
    pub(crate) catalog: C,
}

impl<L: FlashLog> RecordStore<L> {
    /// Creates a store backed by the factory default tables.
    pub fn new(driver: FlashLogDriver<L>) -> Self {
        Self::with_catalog(driver, DefaultCatalog)
    }
}

impl<L: FlashLog, C: SectionCatalog> RecordStore<L, C> {
    pub fn with_catalog(driver: FlashLogDriver<L>, catalog: C) -> Self {
        Self { driver, catalog }
    }

    /// Section of `index`.
    pub fn get_section(&self, index: u16) -> Result<Section, Error> {
        Section::from_index(index).ok_or(Error::OutOfRange(index))
    }

    /// Whether the record of `index` still holds the value written by
    /// [`RecordStore::init_one_record`].
    pub fn get_one_record_status(&mut self, index: u16) -> Result<RecordStatus, Error> {
        let (file_id, size) = self.locate(index)?;
        let (tag, _) = self.get_one_byte_array_data(file_id, index, size)?;
        RecordStatus::from_repr(tag).ok_or(Error::RecordTag(tag))
    }

    /// Resets the record of `index` to its factory default.
    pub fn init_one_record(&mut self, index: u16) -> Result<(), Error> {
        let (file_id, size) = self.locate(index)?;
        let default = self
            .catalog
            .default_payload(index)
            .ok_or(Error::OutOfRange(index))?
            .to_vec();
        if default.len() != size {
            return Err(Error::Setup);
        }

        self.set_one_byte_array_data(file_id, index, TAG_DEFAULT, &default)
    }

    /// Stores `bytes` as the new value of `index` and marks the record as changed.
    ///
    /// `bytes` must be exactly as long as the record of `index`.
    pub fn set_one_record(&mut self, index: u16, bytes: &[u8]) -> Result<(), Error> {
        let (file_id, size) = self.locate(index)?;
        if bytes.len() != size {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "set: index {} takes {} bytes, got {}",
                index,
                size,
                bytes.len()
            );

            return Err(Error::Setup);
        }

        self.set_one_byte_array_data(file_id, index, TAG_CHANGED, bytes)
    }

    /// Value of `index` without its tag. The tag is not checked, see
    /// [`RecordStore::get_one_record_status`].
    pub fn get_one_record(&mut self, index: u16) -> Result<Vec<u8>, Error> {
        let (file_id, size) = self.locate(index)?;
        let (_, payload) = self.get_one_byte_array_data(file_id, index, size)?;
        Ok(payload)
    }

    /// Deletes the record of `index`. The space is reclaimed by the next garbage collection.
    pub fn del_one_record(&mut self, index: u16) -> Result<(), Error> {
        let (file_id, _) = self.locate(index)?;
        self.del_byte_array(file_id, index)
    }

    /// Resets every record to its factory default, stopping at the first failure.
    pub fn init_all_records(&mut self) -> Result<(), Error> {
        for index in FIRST_INDEX..=LAST_INDEX {
            self.init_one_record(index)?;
        }
        Ok(())
    }

    /// True if every record exists and still holds its factory default.
    pub fn is_all_record_valid(&mut self) -> bool {
        (FIRST_INDEX..=LAST_INDEX)
            .all(|index| self.get_one_record_status(index) == Ok(RecordStatus::Unchanged))
    }

    /// Get a typed value.
    ///
    /// `f32`, `u32` and `i32` are read from 4 byte records, `Vec<u8>` from any record.
    pub fn get<R>(&mut self, index: u16) -> Result<R, Error>
    where
        RecordStore<L, C>: Get<R>,
    {
        Get::get(self, index)
    }

    /// Set a typed value and mark the record as changed.
    pub fn set<R>(&mut self, index: u16, value: R) -> Result<(), Error>
    where
        RecordStore<L, C>: Set<R>,
    {
        Set::set(self, index, value)
    }

    pub fn driver(&self) -> &FlashLogDriver<L> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut FlashLogDriver<L> {
        &mut self.driver
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn into_driver(self) -> FlashLogDriver<L> {
        self.driver
    }

    /// File id and payload size of `index`.
    pub(crate) fn locate(&self, index: u16) -> Result<(u16, usize), Error> {
        let section = self.get_section(index)?;
        let size = self
            .catalog
            .size_of(index)
            .ok_or(Error::OutOfRange(index))?;
        Ok((section.file_id(), size))
    }
}
