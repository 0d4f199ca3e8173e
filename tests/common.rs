#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, MultiwriteNorFlash, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use fds_store::fds::{
    FdsError, FdsEvent, FdsEventId, FindToken, FlashLog, FlashRecord, Handler, Record, RecordDesc,
};
use fds_store::{FlashLogDriver, NorFlashLog, RecordStore};
use std::sync::{Arc, Mutex, MutexGuard};

pub const FLASH_PAGE_SIZE: usize = 4096;
pub const WORD_SIZE: usize = 4;
pub const PAGE_TAG_SIZE: usize = 8;
pub const RECORD_HEADER_SIZE: usize = 16;

#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(pages: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_PAGE_SIZE * pages],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(pages: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_PAGE_SIZE * pages],
            fail_after_operation,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    /// Fails every operation after the next `n`.
    pub fn fail_in(&mut self, n: usize) {
        self.fail_after_operation = self.operations.len() + n;
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn word(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.buf[offset..offset + 4].try_into().unwrap())
    }

    pub fn set_word(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));

        if self.operations.len() >= self.fail_after_operation {
            println!("    flash: FAULT");
            return Err(FlashError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;

    const ERASE_SIZE: usize = FLASH_PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));

        println!(
            "    flash: erase: {from:04X} - {to:04X} #{:>2}",
            self.operations.len()
        );

        if self.operations.len() >= self.fail_after_operation {
            println!("    flash: FAULT");
            return Err(FlashError);
        }

        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE as _));
        assert!(!bytes.is_empty());

        println!(
            "    flash: write: 0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );

        if self.operations.len() >= self.fail_after_operation {
            println!("    flash: FAULT");
            return Err(FlashError);
        }

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // NOR flash can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

// writes AND into the cells, so a word may be programmed again
impl MultiwriteNorFlash for Flash {}

impl fds_store::platform::Crc for Flash {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        unsafe { libz_sys::crc32(init as u64, data.as_ptr(), data.len() as u32) as u32 }
    }
}

/// Initialized driver over a fresh flash log of `pages` pages.
pub fn nor_driver(pages: usize) -> FlashLogDriver<NorFlashLog<Flash>> {
    nor_driver_over(Flash::new(pages))
}

pub fn nor_driver_over(flash: Flash) -> FlashLogDriver<NorFlashLog<Flash>> {
    let size = flash.len();
    let log = NorFlashLog::new(0, size, flash).unwrap();
    let mut driver = FlashLogDriver::new(log);
    driver.init(None).unwrap();
    driver
}

pub fn nor_store(pages: usize) -> RecordStore<NorFlashLog<Flash>> {
    RecordStore::new(nor_driver(pages))
}

/// Reopens the flash behind `store` as if the device had rebooted.
pub fn reboot(store: RecordStore<NorFlashLog<Flash>>) -> RecordStore<NorFlashLog<Flash>> {
    let mut flash = store.into_driver().into_inner().into_inner();
    flash.disable_faults();
    flash.operations.clear();
    RecordStore::new(nor_driver_over(flash))
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Op {
    Register,
    Init,
    Find,
    Write,
    Update,
    Delete,
    DeleteFile,
    Gc,
    Open,
    Close,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Stage {
    /// The call itself returns the error and no event follows.
    Issue,
    /// The call succeeds and the event carries the error.
    Completion,
}

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub file_id: u16,
    pub key: u16,
    pub record_id: u32,
    pub data: Vec<u32>,
}

#[derive(Default)]
pub struct Shared {
    pub records: Vec<StoredRecord>,
    pub calls: Vec<Op>,
    pub faults: Vec<(Op, Stage, FdsError)>,
    /// Hold events back until [`MockLog::deliver`] is called.
    pub defer: bool,
    pub pending: Vec<FdsEvent>,
    pub open: usize,
    handler: Option<Handler>,
    next_record_id: u32,
}

impl Shared {
    fn take_fault(&mut self, op: Op, stage: Stage) -> Option<FdsError> {
        let position = self
            .faults
            .iter()
            .position(|&(o, s, _)| o == op && s == stage)?;
        Some(self.faults.remove(position).2)
    }

    pub fn record(&self, file_id: u16, key: u16) -> Option<&StoredRecord> {
        self.records
            .iter()
            .find(|r| r.file_id == file_id && r.key == key)
    }

    pub fn record_mut(&mut self, file_id: u16, key: u16) -> Option<&mut StoredRecord> {
        self.records
            .iter_mut()
            .find(|r| r.file_id == file_id && r.key == key)
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.iter().filter(|&&o| o == op).count()
    }
}

/// Scripted flash log keeping records in memory. Clones share their state.
#[derive(Clone, Default)]
pub struct MockLog {
    pub shared: Arc<Mutex<Shared>>,
}

impl MockLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    pub fn fail(&self, op: Op, stage: Stage, error: FdsError) {
        self.lock().faults.push((op, stage, error));
    }

    /// Delivers held back events, as an interrupt would.
    pub fn deliver(&self) {
        let (handler, events) = {
            let mut shared = self.lock();
            (shared.handler.clone(), std::mem::take(&mut shared.pending))
        };
        if let Some(handler) = handler {
            for event in &events {
                handler(event);
            }
        }
    }

    fn issue<R: Default>(
        &self,
        op: Op,
        mut event: FdsEvent,
        apply: impl FnOnce(&mut Shared, &mut FdsEvent) -> Result<R, FdsError>,
    ) -> Result<R, FdsError> {
        let handler = {
            let mut shared = self.lock();
            shared.calls.push(op);
            if let Some(e) = shared.take_fault(op, Stage::Issue) {
                return Err(e);
            }

            let value = match shared.take_fault(op, Stage::Completion) {
                Some(e) => {
                    event.result = Err(e);
                    R::default()
                }
                None => apply(&mut shared, &mut event)?,
            };

            if shared.defer {
                shared.pending.push(event);
                return Ok(value);
            }
            (shared.handler.clone(), value)
        };

        let (handler, value) = handler;
        if let Some(handler) = handler {
            handler(&event);
        }
        Ok(value)
    }
}

impl FlashLog for MockLog {
    const MAX_RECORD_WORDS: usize = 16;

    fn register(&mut self, handler: Handler) -> Result<(), FdsError> {
        let mut shared = self.lock();
        shared.calls.push(Op::Register);
        if let Some(e) = shared.take_fault(Op::Register, Stage::Issue) {
            return Err(e);
        }
        shared.handler = Some(handler);
        Ok(())
    }

    fn init(&mut self) -> Result<(), FdsError> {
        self.issue(Op::Init, FdsEvent::bare(FdsEventId::Init, Ok(())), |_, _| {
            Ok(())
        })
    }

    fn find(
        &mut self,
        file_id: u16,
        key: u16,
        token: &mut FindToken,
    ) -> Result<RecordDesc, FdsError> {
        let mut shared = self.lock();
        shared.calls.push(Op::Find);
        if let Some(e) = shared.take_fault(Op::Find, Stage::Issue) {
            return Err(e);
        }

        let after = (token.page as u32) << 16 | token.offset as u32;
        let found = shared
            .records
            .iter()
            .find(|r| r.file_id == file_id && r.key == key && r.record_id > after)
            .ok_or(FdsError::NotFound)?;

        token.page = (found.record_id >> 16) as u16;
        token.offset = found.record_id as u16;
        Ok(RecordDesc {
            record_id: found.record_id,
            ..Default::default()
        })
    }

    fn write(&mut self, record: &Record<'_>) -> Result<RecordDesc, FdsError> {
        let event = FdsEvent {
            id: FdsEventId::Write,
            result: Ok(()),
            file_id: record.file_id,
            record_key: record.key,
            record_id: 0,
        };
        self.issue(Op::Write, event, |shared, event| {
            shared.next_record_id += 1;
            let record_id = shared.next_record_id;
            shared.records.push(StoredRecord {
                file_id: record.file_id,
                key: record.key,
                record_id,
                data: record.data.to_vec(),
            });
            event.record_id = record_id;
            Ok(RecordDesc {
                record_id,
                ..Default::default()
            })
        })
    }

    fn update(&mut self, desc: &RecordDesc, record: &Record<'_>) -> Result<RecordDesc, FdsError> {
        let event = FdsEvent {
            id: FdsEventId::Update,
            result: Ok(()),
            file_id: record.file_id,
            record_key: record.key,
            record_id: 0,
        };
        self.issue(Op::Update, event, |shared, event| {
            shared.next_record_id += 1;
            let record_id = shared.next_record_id;
            let stored = shared
                .records
                .iter_mut()
                .find(|r| r.record_id == desc.record_id)
                .ok_or(FdsError::NotFound)?;
            stored.record_id = record_id;
            stored.data = record.data.to_vec();
            event.record_id = record_id;
            Ok(RecordDesc {
                record_id,
                ..Default::default()
            })
        })
    }

    fn delete(&mut self, desc: &RecordDesc) -> Result<(), FdsError> {
        let event = FdsEvent {
            record_id: desc.record_id,
            ..FdsEvent::bare(FdsEventId::DelRecord, Ok(()))
        };
        self.issue(Op::Delete, event, |shared, _| {
            let position = shared
                .records
                .iter()
                .position(|r| r.record_id == desc.record_id)
                .ok_or(FdsError::NotFound)?;
            shared.records.remove(position);
            Ok(())
        })
    }

    fn delete_file(&mut self, file_id: u16) -> Result<(), FdsError> {
        let event = FdsEvent {
            file_id,
            ..FdsEvent::bare(FdsEventId::DelFile, Ok(()))
        };
        self.issue(Op::DeleteFile, event, |shared, _| {
            shared.records.retain(|r| r.file_id != file_id);
            Ok(())
        })
    }

    fn gc(&mut self) -> Result<(), FdsError> {
        self.issue(Op::Gc, FdsEvent::bare(FdsEventId::Gc, Ok(())), |_, _| Ok(()))
    }

    fn open(&mut self, desc: &RecordDesc) -> Result<FlashRecord, FdsError> {
        let mut shared = self.lock();
        shared.calls.push(Op::Open);
        if let Some(e) = shared.take_fault(Op::Open, Stage::Issue) {
            return Err(e);
        }

        let stored = shared
            .records
            .iter()
            .find(|r| r.record_id == desc.record_id)
            .cloned()
            .ok_or(FdsError::NotFound)?;
        shared.open += 1;
        Ok(FlashRecord {
            file_id: stored.file_id,
            key: stored.key,
            record_id: stored.record_id,
            data: stored.data,
        })
    }

    fn close(&mut self, _desc: &RecordDesc) -> Result<(), FdsError> {
        let mut shared = self.lock();
        shared.calls.push(Op::Close);
        if let Some(e) = shared.take_fault(Op::Close, Stage::Issue) {
            return Err(e);
        }
        if shared.open == 0 {
            return Err(FdsError::NoOpenRecords);
        }
        shared.open -= 1;
        Ok(())
    }
}

/// Initialized driver over a fresh [`MockLog`] and a handle to its state.
pub fn mock_driver() -> (FlashLogDriver<MockLog>, MockLog) {
    let log = MockLog::new();
    let handle = log.clone();
    let mut driver = FlashLogDriver::new(log);
    driver.init(None).unwrap();
    (driver, handle)
}

pub fn mock_store() -> (RecordStore<MockLog>, MockLog) {
    let (driver, handle) = mock_driver();
    (RecordStore::new(driver), handle)
}
