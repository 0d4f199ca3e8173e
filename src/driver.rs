//! Synchronous facade over an asynchronous [`FlashLog`].
//!
//! Every mutating operation follows the same sequence: mark the operation kind as issued,
//! issue it, suspend in the [`WaitStrategy`] until the completion callback has recorded a
//! result, then consume that result. The completion states live in [`Completions`], which is
//! shared with the registered callback and may be written from interrupt context.

use crate::fds::{
    FILE_ID_MAX, FdsError, FdsEvent, FdsEventId, FindToken, FlashLog, Handler, RECORD_KEY_MAX,
    Record, RecordDesc,
};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
#[cfg(feature = "defmt")]
use defmt::{error, trace, warn};

/// Operation kinds that complete through the callback.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(usize)]
pub enum OpKind {
    Init = 0,
    Write = 1,
    Update = 2,
    Delete = 3,
    Gc = 4,
}

impl OpKind {
    /// Record and file deletions share one completion slot.
    pub fn of(id: FdsEventId) -> Self {
        match id {
            FdsEventId::Init => OpKind::Init,
            FdsEventId::Write => OpKind::Write,
            FdsEventId::Update => OpKind::Update,
            FdsEventId::DelRecord | FdsEventId::DelFile => OpKind::Delete,
            FdsEventId::Gc => OpKind::Gc,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpState {
    Idle,
    Issued,
    Completed(Result<(), FdsError>),
}

const STATE_IDLE: u32 = 0;
const STATE_ISSUED: u32 = 1;
const STATE_SUCCEEDED: u32 = 2;
// the low half carries the FDS error code
const STATE_FAILED: u32 = 0x1_0000;

impl OpState {
    fn encode(self) -> u32 {
        match self {
            OpState::Idle => STATE_IDLE,
            OpState::Issued => STATE_ISSUED,
            OpState::Completed(Ok(())) => STATE_SUCCEEDED,
            OpState::Completed(Err(e)) => STATE_FAILED | e.code() as u32,
        }
    }

    fn decode(raw: u32) -> Self {
        match raw {
            STATE_IDLE => OpState::Idle,
            STATE_ISSUED => OpState::Issued,
            STATE_SUCCEEDED => OpState::Completed(Ok(())),
            _ => OpState::Completed(Err(
                FdsError::from_repr((raw & 0xFFFF) as u16).unwrap_or(FdsError::Internal),
            )),
        }
    }
}

/// Per-kind `Idle -> Issued -> Completed(result)` state machines.
#[derive(Default, Debug)]
pub struct Completions {
    states: [AtomicU32; 5],
}

impl Completions {
    pub fn state(&self, kind: OpKind) -> OpState {
        OpState::decode(self.states[kind as usize].load(Ordering::Acquire))
    }

    /// Called from the completion callback.
    pub fn complete(&self, kind: OpKind, result: Result<(), FdsError>) {
        self.states[kind as usize].store(OpState::Completed(result).encode(), Ordering::Release);
    }

    fn issue(&self, kind: OpKind) {
        self.states[kind as usize].store(STATE_ISSUED, Ordering::Release);
    }

    /// Returns the current state and moves the slot back to idle.
    fn consume(&self, kind: OpKind) -> OpState {
        let state = self.state(kind);
        self.states[kind as usize].store(STATE_IDLE, Ordering::Release);
        state
    }

    fn reset(&self) {
        for state in &self.states {
            state.store(STATE_IDLE, Ordering::Release);
        }
    }
}

/// Suspends the caller until an issued operation has completed.
pub trait WaitStrategy {
    /// Returns once `done` yields true. A strategy may give up earlier, in which case the
    /// driver reports [`FdsError::OperationTimeout`].
    fn wait(&mut self, done: &dyn Fn() -> bool);
}

impl<F: FnMut(&dyn Fn() -> bool)> WaitStrategy for F {
    fn wait(&mut self, done: &dyn Fn() -> bool) {
        self(done)
    }
}

/// Idles the core between completion checks. Never gives up.
#[derive(Debug, Default, Copy, Clone)]
pub struct SleepUntilEvent;

impl WaitStrategy for SleepUntilEvent {
    fn wait(&mut self, done: &dyn Fn() -> bool) {
        while !done() {
            #[cfg(feature = "cortex-m")]
            cortex_m::asm::wfe();

            #[cfg(not(feature = "cortex-m"))]
            core::hint::spin_loop();
        }
    }
}

/// Polls at most `spins` times.
#[derive(Debug, Copy, Clone)]
pub struct BoundedSpin {
    pub spins: u32,
}

impl WaitStrategy for BoundedSpin {
    fn wait(&mut self, done: &dyn Fn() -> bool) {
        for _ in 0..self.spins {
            if done() {
                return;
            }
            core::hint::spin_loop();
        }
    }
}

/// Owns the pending record and drives one operation at a time through the flash log.
pub struct FlashLogDriver<L: FlashLog> {
    log: L,
    file_id: u16,
    record_key: u16,
    words: Vec<u32>,
    desc: RecordDesc,
    token: FindToken,
    last_result: Result<(), FdsError>,
    completions: Arc<Completions>,
    wait: Box<dyn WaitStrategy>,
}

impl<L: FlashLog> FlashLogDriver<L> {
    /// Creates a driver that sleeps until the next event while waiting for completions.
    pub fn new(log: L) -> Self {
        Self::with_wait_strategy(log, SleepUntilEvent)
    }

    pub fn with_wait_strategy(log: L, wait: impl WaitStrategy + 'static) -> Self {
        Self {
            log,
            file_id: 0,
            record_key: 0,
            words: Vec::new(),
            desc: RecordDesc::default(),
            token: FindToken::default(),
            last_result: Ok(()),
            completions: Arc::new(Completions::default()),
            wait: Box::new(wait),
        }
    }

    pub fn set_wait_strategy(&mut self, wait: impl WaitStrategy + 'static) {
        self.wait = Box::new(wait);
    }

    /// Sets up the record used by the following write, update, find, read or delete.
    ///
    /// `words` may be empty when only locating, reading or deleting.
    pub fn configure_record(
        &mut self,
        file_id: u16,
        record_key: u16,
        words: &[u32],
    ) -> Result<(), FdsError> {
        if file_id > FILE_ID_MAX || record_key == 0 || record_key > RECORD_KEY_MAX {
            #[cfg(feature = "defmt")]
            warn!(
                "configure_record: file id {:#x} or record key {:#x} out of range",
                file_id, record_key
            );

            #[cfg(feature = "debug-logs")]
            println!("driver: configure_record: {file_id:#06x}/{record_key:#06x} out of range");

            return self.finish(Err(FdsError::InvalidArg));
        }

        if words.len() > L::MAX_RECORD_WORDS {
            #[cfg(feature = "defmt")]
            warn!("configure_record: {} words is too large", words.len());

            #[cfg(feature = "debug-logs")]
            println!("driver: configure_record: {} words is too large", words.len());

            return self.finish(Err(FdsError::RecordTooLarge));
        }

        self.file_id = file_id;
        self.record_key = record_key;
        self.words.clear();
        self.words.extend_from_slice(words);
        Ok(())
    }

    /// Registers the completion callback, starts the flash log and blocks until it reports
    /// back. Events are forwarded to `observer`, or logged if none is given.
    pub fn init(&mut self, observer: Option<Handler>) -> Result<(), FdsError> {
        #[cfg(feature = "defmt")]
        trace!("init");

        #[cfg(feature = "debug-logs")]
        println!("driver: init");

        self.reset();

        let completions = self.completions.clone();
        let observer: Handler = match observer {
            Some(observer) => observer,
            None => Arc::new(log_event),
        };
        let dispatcher: Handler = Arc::new(move |event: &FdsEvent| {
            completions.complete(OpKind::of(event.id), event.result);
            observer(event);
        });

        if let Err(e) = self.log.register(dispatcher) {
            #[cfg(feature = "defmt")]
            error!("init: handler registration failed: {}", e);

            return self.finish(Err(e));
        }

        self.completions.issue(OpKind::Init);
        if let Err(e) = self.log.init() {
            self.completions.consume(OpKind::Init);

            #[cfg(feature = "defmt")]
            error!("init: failed: {}", e);

            return self.finish(Err(e));
        }

        self.wait_for(OpKind::Init)
    }

    /// Writes the configured record as a new record.
    pub fn write(&mut self) -> Result<(), FdsError> {
        #[cfg(feature = "defmt")]
        trace!("write: {:#x}/{:#x}", self.file_id, self.record_key);

        #[cfg(feature = "debug-logs")]
        println!("driver: write {:#06x}/{:#06x}", self.file_id, self.record_key);

        let record = Record {
            file_id: self.file_id,
            key: self.record_key,
            data: &self.words,
        };

        self.completions.issue(OpKind::Write);
        match self.log.write(&record) {
            Ok(desc) => self.desc = desc,
            Err(e) => return self.abandon(OpKind::Write, e),
        }

        self.wait_for(OpKind::Write)
    }

    /// Locates the configured record with a fresh token.
    pub fn find(&mut self) -> Result<(), FdsError> {
        self.token = FindToken::default();
        let result = match self
            .log
            .find(self.file_id, self.record_key, &mut self.token)
        {
            Ok(desc) => {
                self.desc = desc;
                Ok(())
            }
            Err(e) => Err(e),
        };

        #[cfg(feature = "defmt")]
        trace!(
            "find: {:#x}/{:#x}: {}",
            self.file_id, self.record_key, result
        );

        #[cfg(feature = "debug-logs")]
        println!(
            "driver: find {:#06x}/{:#06x}: {result:?}",
            self.file_id, self.record_key
        );

        self.finish(result)
    }

    /// Reads the configured record into `out`. The number of words copied is the length
    /// stored in the record header, not the length of the configured record.
    pub fn read(&mut self, out: &mut Vec<u32>) -> Result<(), FdsError> {
        self.find()?;

        let record = match self.log.open(&self.desc) {
            Ok(record) => record,
            Err(e) => {
                #[cfg(feature = "defmt")]
                warn!("read: open failed: {}", e);

                return self.finish(Err(e));
            }
        };

        out.clear();
        out.extend_from_slice(&record.data);

        if let Err(e) = self.log.close(&self.desc) {
            #[cfg(feature = "defmt")]
            warn!("read: close failed: {}", e);

            return self.finish(Err(e));
        }

        #[cfg(feature = "defmt")]
        trace!(
            "read: {:#x}/{:#x}: {} words",
            self.file_id,
            self.record_key,
            out.len()
        );

        #[cfg(feature = "debug-logs")]
        println!("driver: read {} words: {out:08x?}", out.len());

        self.finish(Ok(()))
    }

    /// Replaces the existing configured record with the configured payload.
    pub fn update(&mut self) -> Result<(), FdsError> {
        self.find()?;

        #[cfg(feature = "defmt")]
        trace!("update: {:#x}/{:#x}", self.file_id, self.record_key);

        #[cfg(feature = "debug-logs")]
        println!("driver: update {:#06x}/{:#06x}", self.file_id, self.record_key);

        let record = Record {
            file_id: self.file_id,
            key: self.record_key,
            data: &self.words,
        };

        self.completions.issue(OpKind::Update);
        match self.log.update(&self.desc, &record) {
            Ok(desc) => self.desc = desc,
            Err(e) => return self.abandon(OpKind::Update, e),
        }

        self.wait_for(OpKind::Update)
    }

    /// Deletes the configured record.
    pub fn delete(&mut self) -> Result<(), FdsError> {
        self.find()?;

        #[cfg(feature = "defmt")]
        trace!("delete: {:#x}/{:#x}", self.file_id, self.record_key);

        #[cfg(feature = "debug-logs")]
        println!("driver: delete {:#06x}/{:#06x}", self.file_id, self.record_key);

        self.completions.issue(OpKind::Delete);
        if let Err(e) = self.log.delete(&self.desc) {
            return self.abandon(OpKind::Delete, e);
        }

        self.wait_for(OpKind::Delete)
    }

    /// Deletes every record of `file_id`.
    pub fn delete_file(&mut self, file_id: u16) -> Result<(), FdsError> {
        if file_id > FILE_ID_MAX {
            return self.finish(Err(FdsError::InvalidArg));
        }

        #[cfg(feature = "defmt")]
        trace!("delete_file: {:#x}", file_id);

        #[cfg(feature = "debug-logs")]
        println!("driver: delete_file {file_id:#06x}");

        self.completions.issue(OpKind::Delete);
        if let Err(e) = self.log.delete_file(file_id) {
            return self.abandon(OpKind::Delete, e);
        }

        self.wait_for(OpKind::Delete)
    }

    pub fn garbage_collect(&mut self) -> Result<(), FdsError> {
        #[cfg(feature = "defmt")]
        trace!("garbage_collect");

        #[cfg(feature = "debug-logs")]
        println!("driver: garbage_collect");

        self.completions.issue(OpKind::Gc);
        if let Err(e) = self.log.gc() {
            return self.abandon(OpKind::Gc, e);
        }

        self.wait_for(OpKind::Gc)
    }

    /// Result of the most recent operation.
    pub fn last_result(&self) -> Result<(), FdsError> {
        self.last_result
    }

    pub fn state(&self, kind: OpKind) -> OpState {
        self.completions.state(kind)
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut L {
        &mut self.log
    }

    pub fn into_inner(self) -> L {
        self.log
    }

    fn reset(&mut self) {
        self.file_id = 0;
        self.record_key = 0;
        self.words.clear();
        self.desc = RecordDesc::default();
        self.token = FindToken::default();
        self.last_result = Ok(());
        self.completions.reset();
    }

    fn wait_for(&mut self, kind: OpKind) -> Result<(), FdsError> {
        let completions = &self.completions;
        self.wait.wait(&|| completions.state(kind) != OpState::Issued);

        let result = match completions.consume(kind) {
            OpState::Completed(result) => result,
            OpState::Issued => Err(FdsError::OperationTimeout),
            OpState::Idle => Err(FdsError::Internal),
        };

        #[cfg(feature = "defmt")]
        match result {
            Ok(()) => trace!("{}: completed", kind),
            Err(e) => warn!("{}: completed with {}", kind, e),
        }

        #[cfg(feature = "debug-logs")]
        println!("driver: {kind}: completed with {result:?}");

        self.finish(result)
    }

    /// The operation was rejected before it was issued, so no completion will follow.
    fn abandon(&mut self, kind: OpKind, e: FdsError) -> Result<(), FdsError> {
        self.completions.consume(kind);

        #[cfg(feature = "defmt")]
        warn!(
            "{}: {:#x}/{:#x} rejected: {}",
            kind, self.file_id, self.record_key, e
        );

        #[cfg(feature = "debug-logs")]
        println!(
            "driver: {kind}: {:#06x}/{:#06x} rejected: {e:?}",
            self.file_id, self.record_key
        );

        self.finish(Err(e))
    }

    fn finish(&mut self, result: Result<(), FdsError>) -> Result<(), FdsError> {
        self.last_result = result;
        result
    }
}

#[cfg_attr(
    not(any(feature = "defmt", feature = "debug-logs")),
    allow(unused_variables)
)]
fn log_event(event: &FdsEvent) {
    #[cfg(feature = "defmt")]
    match event.result {
        Ok(()) => trace!(
            "event {}: {:#x}/{:#x}",
            event.id, event.file_id, event.record_key
        ),
        Err(e) => warn!("event {} failed: {}", event.id, e),
    }

    #[cfg(feature = "debug-logs")]
    println!("driver: event {event:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_encoding_is_lossless() {
        for state in [
            OpState::Idle,
            OpState::Issued,
            OpState::Completed(Ok(())),
            OpState::Completed(Err(FdsError::NoSpaceInFlash)),
            OpState::Completed(Err(FdsError::Internal)),
        ] {
            assert_eq!(OpState::decode(state.encode()), state);
        }
    }

    #[test]
    fn completions_follow_issue_complete_consume() {
        let completions = Completions::default();
        assert_eq!(completions.state(OpKind::Write), OpState::Idle);

        completions.issue(OpKind::Write);
        assert_eq!(completions.state(OpKind::Write), OpState::Issued);
        assert_eq!(completions.state(OpKind::Update), OpState::Idle);

        completions.complete(OpKind::Write, Err(FdsError::Busy));
        assert_eq!(
            completions.consume(OpKind::Write),
            OpState::Completed(Err(FdsError::Busy))
        );
        assert_eq!(completions.state(OpKind::Write), OpState::Idle);
    }

    #[test]
    fn deletions_share_a_slot() {
        assert_eq!(OpKind::of(FdsEventId::DelRecord), OpKind::Delete);
        assert_eq!(OpKind::of(FdsEventId::DelFile), OpKind::Delete);
    }
}
