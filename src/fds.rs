//! The flash log the driver sits on: a wear-leveled, append-only, garbage-collected key-value
//! store addressed by `(file_id, record_key)`. On an nRF52 this is the SDK's Flash Data
//! Storage module; [`crate::nor_log::NorFlashLog`] is a self-contained implementation on top of
//! any NOR flash.
//!
//! Mutating operations are asynchronous. `write`, `update`, `delete`, `delete_file`, `gc` and
//! `init` only *issue* the operation; its outcome is delivered later through the [`Handler`]
//! passed to [`FlashLog::register`]. Implementations may invoke the handler before the issuing
//! call returns.

use alloc::sync::Arc;
use alloc::vec::Vec;
use thiserror::Error;

/// Largest file id outside of the range reserved by the flash log.
pub const FILE_ID_MAX: u16 = 0xBFFF;

/// Largest record key outside of the range reserved by the flash log. Key `0x0000` is reserved
/// as well.
pub const RECORD_KEY_MAX: u16 = 0xBFFF;

/// Result codes of the flash log. The discriminants match the numeric FDS codes.
#[derive(Error, strum::FromRepr, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum FdsError {
    #[error("operation timeout")]
    OperationTimeout = 1,

    #[error("flash log not initialized")]
    NotInitialized = 2,

    #[error("unaligned address")]
    UnalignedAddr = 3,

    #[error("invalid argument")]
    InvalidArg = 4,

    #[error("null argument")]
    NullArg = 5,

    #[error("no open records")]
    NoOpenRecords = 6,

    /// No data page has enough room left. Garbage collection might help.
    #[error("no space in flash")]
    NoSpaceInFlash = 7,

    #[error("no space in queues")]
    NoSpaceInQueues = 8,

    #[error("record too large")]
    RecordTooLarge = 9,

    #[error("record not found")]
    NotFound = 10,

    #[error("no pages")]
    NoPages = 11,

    #[error("user limit reached")]
    UserLimitReached = 12,

    #[error("crc check failed")]
    CrcCheckFailed = 13,

    #[error("busy")]
    Busy = 14,

    #[error("internal error")]
    Internal = 15,
}

impl FdsError {
    /// Numeric FDS result code.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Identifies a record once it has been found or written. Implementations are free to
/// interpret the fields; callers should treat them as opaque.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordDesc {
    pub record_id: u32,
    pub page: u16,
    pub offset: u16,
}

/// Search cursor for [`FlashLog::find`]. A search resumes after the position held by the
/// token, so a token must be reset to `FindToken::default()` before every new search.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FindToken {
    pub page: u16,
    pub offset: u16,
}

impl FindToken {
    /// True until the token has been advanced by a search.
    pub fn is_fresh(&self) -> bool {
        *self == FindToken::default()
    }
}

/// A record to be written.
#[derive(Debug, Copy, Clone)]
pub struct Record<'a> {
    pub file_id: u16,
    pub key: u16,
    pub data: &'a [u32],
}

/// A record as read back by [`FlashLog::open`]. The length of `data` is the length stored in
/// the record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRecord {
    pub file_id: u16,
    pub key: u16,
    pub record_id: u32,
    pub data: Vec<u32>,
}

#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FdsEventId {
    Init,
    Write,
    Update,
    DelRecord,
    DelFile,
    Gc,
}

/// Completion of an issued operation.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FdsEvent {
    pub id: FdsEventId,
    pub result: Result<(), FdsError>,
    pub file_id: u16,
    pub record_key: u16,
    pub record_id: u32,
}

impl FdsEvent {
    /// Event without a record reference (init, gc).
    pub fn bare(id: FdsEventId, result: Result<(), FdsError>) -> Self {
        Self {
            id,
            result,
            file_id: 0,
            record_key: 0,
            record_id: 0,
        }
    }
}

/// Completion callback. It may be invoked from interrupt context.
pub type Handler = Arc<dyn Fn(&FdsEvent) + Send + Sync>;

pub trait FlashLog {
    /// Largest payload, in words, a single record may carry.
    const MAX_RECORD_WORDS: usize;

    /// Registers the completion callback. Must be called before [`FlashLog::init`].
    fn register(&mut self, handler: Handler) -> Result<(), FdsError>;

    /// Starts the flash log; completes with [`FdsEventId::Init`].
    fn init(&mut self) -> Result<(), FdsError>;

    /// Finds the next record with the given file id and key after the position held by
    /// `token`. Synchronous.
    fn find(&mut self, file_id: u16, key: u16, token: &mut FindToken)
    -> Result<RecordDesc, FdsError>;

    /// Issues a write; completes with [`FdsEventId::Write`].
    fn write(&mut self, record: &Record<'_>) -> Result<RecordDesc, FdsError>;

    /// Issues an update of `desc`, replacing it with `record`; completes with
    /// [`FdsEventId::Update`].
    fn update(&mut self, desc: &RecordDesc, record: &Record<'_>) -> Result<RecordDesc, FdsError>;

    /// Issues a delete of `desc`; completes with [`FdsEventId::DelRecord`].
    fn delete(&mut self, desc: &RecordDesc) -> Result<(), FdsError>;

    /// Issues a delete of every record in `file_id`; completes with [`FdsEventId::DelFile`].
    fn delete_file(&mut self, file_id: u16) -> Result<(), FdsError>;

    /// Issues a garbage collection; completes with [`FdsEventId::Gc`].
    fn gc(&mut self) -> Result<(), FdsError>;

    /// Opens `desc` and returns its contents. Synchronous.
    fn open(&mut self, desc: &RecordDesc) -> Result<FlashRecord, FdsError>;

    /// Closes a record opened with [`FlashLog::open`]. Synchronous.
    fn close(&mut self, desc: &RecordDesc) -> Result<(), FdsError>;
}

impl<L: FlashLog> FlashLog for &mut L {
    const MAX_RECORD_WORDS: usize = L::MAX_RECORD_WORDS;

    fn register(&mut self, handler: Handler) -> Result<(), FdsError> {
        (*self).register(handler)
    }

    fn init(&mut self) -> Result<(), FdsError> {
        (*self).init()
    }

    fn find(
        &mut self,
        file_id: u16,
        key: u16,
        token: &mut FindToken,
    ) -> Result<RecordDesc, FdsError> {
        (*self).find(file_id, key, token)
    }

    fn write(&mut self, record: &Record<'_>) -> Result<RecordDesc, FdsError> {
        (*self).write(record)
    }

    fn update(&mut self, desc: &RecordDesc, record: &Record<'_>) -> Result<RecordDesc, FdsError> {
        (*self).update(desc, record)
    }

    fn delete(&mut self, desc: &RecordDesc) -> Result<(), FdsError> {
        (*self).delete(desc)
    }

    fn delete_file(&mut self, file_id: u16) -> Result<(), FdsError> {
        (*self).delete_file(file_id)
    }

    fn gc(&mut self) -> Result<(), FdsError> {
        (*self).gc()
    }

    fn open(&mut self, desc: &RecordDesc) -> Result<FlashRecord, FdsError> {
        (*self).open(desc)
    }

    fn close(&mut self, desc: &RecordDesc) -> Result<(), FdsError> {
        (*self).close(desc)
    }
}
