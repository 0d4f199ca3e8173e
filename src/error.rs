use thiserror::Error;

pub use crate::fds::FdsError;

/// Errors of the record store. Every variant wrapping an [`FdsError`] carries the code the
/// flash log reported for the failing step.
#[derive(Error, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The record could not be configured: file id or key out of range, payload too large,
    /// or a payload whose length differs from the size of its index.
    #[error("record setup failed")]
    Setup,

    /// Searching for the record failed with something other than "not found".
    #[error("record lookup failed: {0}")]
    Lookup(FdsError),

    /// The record exists but could not be read back, or holds fewer bytes than declared.
    #[error("record read failed: {0}")]
    Read(FdsError),

    /// Writing or updating failed, also after a garbage collection.
    #[error("record write failed: {0}")]
    Write(FdsError),

    #[error("record delete failed: {0}")]
    Delete(FdsError),

    /// Garbage collection triggered by a failed write did not complete.
    #[error("garbage collection failed: {0}")]
    GarbageCollection(FdsError),

    /// No record has been written for the index yet, or it has been deleted.
    #[error("record not found")]
    NotFound,

    #[error("index {0} out of range")]
    OutOfRange(u16),

    /// The tag byte read back is neither the default nor the changed marker. Never repaired
    /// automatically.
    #[error("invalid record tag {0:#04x}")]
    RecordTag(u8),
}

/// Whether a record still holds the value it was initialized with.
#[derive(strum::FromRepr, strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RecordStatus {
    Unchanged = crate::catalog::TAG_DEFAULT,
    Changed = crate::catalog::TAG_CHANGED,
}
