//! A log-structured [`FlashLog`] on top of any [`NorFlash`](embedded_storage::nor_flash::NorFlash).
//!
//! Records are appended to data pages and never modified in place, except for the deletion
//! marker. One page is always kept as swap page; garbage collection copies the valid records
//! of a page into it, erases the source and swaps the roles of the two pages.
//!
//! Mounting keeps only the newest valid record of every `(file_id, key)` pair, so an update
//! cut short between writing the new copy and deleting the old one resolves to the new copy.
//!
//! All operations run to completion inside the issuing call. The completion event is
//! delivered to the registered handler before the call returns.

use crate::fds::{
    FILE_ID_MAX, FdsError, FdsEvent, FdsEventId, FindToken, FlashLog, FlashRecord, Handler,
    RECORD_KEY_MAX, Record, RecordDesc,
};
use crate::platform::{AlignedOps, Platform};
use crate::raw::{
    self, BLANK, HEADER_WORDS, PAGE_MAGIC, PAGE_SIZE, PAGE_TAG_WORDS, PAGE_TYPE_DATA,
    PAGE_TYPE_SWAP, PAGE_WORDS, PageTag, RecordHeader, WORD_SIZE,
};
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::{debug, trace, warn};

/// Usage of the partition as seen by the last scan and the operations since.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NorLogStatistics {
    /// Data pages, the swap page excluded.
    pub pages_available: u16,
    pub open_records: u16,
    pub valid_records: u16,
    /// Deleted, superseded or torn records.
    pub dirty_records: u16,
    /// Words written to data pages, page tags excluded.
    pub words_used: u32,
    /// Words a garbage collection would reclaim.
    pub freeable_words: u32,
    /// Largest payload, in words, that fits into a single data page right now.
    pub largest_contig: u32,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
enum PageRole {
    Data,
    Swap,
}

#[derive(Debug, Clone)]
struct PageInfo {
    role: PageRole,
    /// First blank word.
    write_offset: usize,
    valid_records: u16,
    dirty_records: u16,
    dirty_words: usize,
}

impl PageInfo {
    fn swap() -> Self {
        Self {
            role: PageRole::Swap,
            write_offset: PAGE_TAG_WORDS,
            valid_records: 0,
            dirty_records: 0,
            dirty_words: 0,
        }
    }

    fn data() -> Self {
        Self {
            role: PageRole::Data,
            ..Self::swap()
        }
    }

    fn free_words(&self) -> usize {
        PAGE_WORDS - self.write_offset
    }

    fn fits(&self, len_words: usize) -> bool {
        self.role == PageRole::Data && self.free_words() >= HEADER_WORDS + len_words
    }
}

enum Slot {
    /// No more records on this page.
    End,
    /// A record header claims more words than the page has left.
    Overflow,
    Record {
        header: RecordHeader,
        data: Vec<u32>,
        /// The CRC matches. Deleted records stay intact.
        intact: bool,
        /// Intact and not deleted.
        valid: bool,
    },
}

pub struct NorFlashLog<T: Platform> {
    hal: T,
    base_address: u32,
    page_count: usize,
    pages: Vec<PageInfo>,
    handler: Option<Handler>,
    initialized: bool,
    next_record_id: u32,
    open: Vec<RecordDesc>,
}

impl<T: Platform> NorFlashLog<T> {
    /// Creates a flash log over `partition_size` bytes starting at `partition_offset`. The
    /// flash is not touched until [`FlashLog::init`].
    pub fn new(
        partition_offset: usize,
        partition_size: usize,
        hal: T,
    ) -> Result<NorFlashLog<T>, FdsError> {
        if !partition_offset.is_multiple_of(PAGE_SIZE)
            || !PAGE_SIZE.is_multiple_of(T::ERASE_SIZE)
            || T::align_write_ceil(WORD_SIZE) != WORD_SIZE
            || T::align_read(WORD_SIZE) != WORD_SIZE
        {
            return Err(FdsError::UnalignedAddr);
        }

        if !partition_size.is_multiple_of(PAGE_SIZE) {
            return Err(FdsError::InvalidArg);
        }

        let pages = partition_size / PAGE_SIZE;
        if pages < 2 || pages > u16::MAX as usize {
            return Err(FdsError::NoPages);
        }

        let base_address = u32::try_from(partition_offset).map_err(|_| FdsError::InvalidArg)?;

        Ok(Self {
            hal,
            base_address,
            page_count: pages,
            pages: Vec::with_capacity(pages),
            handler: None,
            initialized: false,
            next_record_id: 1,
            open: Vec::new(),
        })
    }

    pub fn statistics(&self) -> NorLogStatistics {
        let mut stats = NorLogStatistics {
            open_records: self.open.len() as u16,
            ..Default::default()
        };

        for page in self.pages.iter().filter(|page| page.role == PageRole::Data) {
            stats.pages_available += 1;
            stats.valid_records += page.valid_records;
            stats.dirty_records += page.dirty_records;
            stats.words_used += (page.write_offset - PAGE_TAG_WORDS) as u32;
            stats.freeable_words += page.dirty_words as u32;
            let room = page.free_words().saturating_sub(HEADER_WORDS) as u32;
            stats.largest_contig = stats.largest_contig.max(room);
        }

        stats
    }

    pub fn hal(&self) -> &T {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut T {
        &mut self.hal
    }

    pub fn into_inner(self) -> T {
        self.hal
    }

    fn address(&self, page: usize, word: usize) -> u32 {
        self.base_address + (page * PAGE_SIZE + word * WORD_SIZE) as u32
    }

    fn emit(&self, event: FdsEvent) {
        #[cfg(feature = "defmt")]
        trace!("event {}: {}", event.id, event.result);

        #[cfg(feature = "debug-logs")]
        println!("nor_log: event {event:?}");

        if let Some(handler) = &self.handler {
            handler(&event);
        }
    }

    fn ensure_initialized(&self) -> Result<(), FdsError> {
        if self.initialized {
            Ok(())
        } else {
            Err(FdsError::NotInitialized)
        }
    }

    fn read_tag(&mut self, page: usize) -> Result<PageTag, T::Error> {
        let address = self.address(page, 0);
        let words = raw::read_words(&mut self.hal, address, PAGE_TAG_WORDS)?;
        Ok(PageTag::parse([words[0], words[1]]))
    }

    fn write_tag(&mut self, page: usize, page_type: u32) -> Result<(), T::Error> {
        let address = self.address(page, 0);
        raw::write_words(&mut self.hal, address, &[PAGE_MAGIC, page_type])
    }

    fn erase_page(&mut self, page: usize) -> Result<(), T::Error> {
        #[cfg(feature = "defmt")]
        debug!("erase page {}", page);

        #[cfg(feature = "debug-logs")]
        println!("nor_log: erase page {page}");

        let from = self.address(page, 0);
        self.hal.erase(from, from + PAGE_SIZE as u32)
    }

    fn read_slot(&mut self, page: usize, offset: usize) -> Result<Slot, T::Error> {
        if offset + HEADER_WORDS > PAGE_WORDS {
            return Ok(Slot::End);
        }

        let address = self.address(page, offset);
        let words = raw::read_words(&mut self.hal, address, HEADER_WORDS)?;
        if words[0] == BLANK {
            return Ok(Slot::End);
        }

        let header = RecordHeader::from_words([words[0], words[1], words[2], words[3]]);
        if offset + header.total_words() > PAGE_WORDS {
            return Ok(Slot::Overflow);
        }

        let address = self.address(page, offset + HEADER_WORDS);
        let data = raw::read_words(&mut self.hal, address, header.len_words as usize)?;
        let intact = header.crc_matches::<T>(&data);

        Ok(Slot::Record {
            header,
            data,
            intact,
            valid: intact && !header.is_deleted(),
        })
    }

    /// Programs a complete record at the write offset of `page`.
    fn program(
        &mut self,
        page: usize,
        header: &RecordHeader,
        data: &[u32],
    ) -> Result<usize, T::Error> {
        let offset = self.pages[page].write_offset;
        let total = header.total_words();

        // the space is lost even if programming fails half way
        let info = &mut self.pages[page];
        info.write_offset += total;
        info.dirty_records += 1;
        info.dirty_words += total;

        let address = self.address(page, offset);
        let programmed = self.program_at(address, header, data);

        if let Err(e) = programmed {
            // the first header word may still be blank, so nothing may follow on this page
            let info = &mut self.pages[page];
            info.dirty_words += PAGE_WORDS - info.write_offset;
            info.write_offset = PAGE_WORDS;
            return Err(e);
        }

        let info = &mut self.pages[page];
        info.dirty_records -= 1;
        info.dirty_words -= total;
        info.valid_records += 1;

        Ok(offset)
    }

    /// Writes the first header word, then the payload, then the rest of the header.
    fn program_at(
        &mut self,
        address: u32,
        header: &RecordHeader,
        data: &[u32],
    ) -> Result<(), T::Error> {
        let words = header.to_words();
        raw::write_words(&mut self.hal, address, &words[..1])?;
        raw::write_words(
            &mut self.hal,
            address + (HEADER_WORDS * WORD_SIZE) as u32,
            data,
        )?;
        raw::write_words(&mut self.hal, address + WORD_SIZE as u32, &words[1..])
    }

    fn append(&mut self, record: &Record<'_>) -> Result<Result<RecordDesc, FdsError>, T::Error> {
        let Some(page) = self
            .pages
            .iter()
            .position(|page| page.fits(record.data.len()))
        else {
            return Ok(Err(FdsError::NoSpaceInFlash));
        };

        let record_id = self.next_record_id;
        self.next_record_id = self.next_record_id.wrapping_add(1).max(1);

        let header = RecordHeader::new::<T>(record.file_id, record.key, record_id, record.data);
        let offset = self.program(page, &header, record.data)?;

        #[cfg(feature = "defmt")]
        trace!(
            "append {:#x}/{:#x} #{} @{}:{}",
            record.file_id, record.key, record_id, page, offset
        );

        #[cfg(feature = "debug-logs")]
        println!(
            "nor_log: append {:#06x}/{:#06x} #{record_id} @{page}:{offset}",
            record.file_id, record.key
        );

        Ok(Ok(RecordDesc {
            record_id,
            page: page as u16,
            offset: offset as u16,
        }))
    }

    /// Header of the valid record `desc` points to.
    fn resolve(&mut self, desc: &RecordDesc) -> Result<Result<RecordHeader, FdsError>, T::Error> {
        let page = desc.page as usize;
        let offset = desc.offset as usize;
        if page >= self.pages.len()
            || self.pages[page].role != PageRole::Data
            || offset < PAGE_TAG_WORDS
            || offset >= self.pages[page].write_offset
        {
            return Ok(Err(FdsError::NotFound));
        }

        match self.read_slot(page, offset)? {
            Slot::Record { header, valid, .. }
                if valid && header.record_id == desc.record_id =>
            {
                Ok(Ok(header))
            }
            _ => Ok(Err(FdsError::NotFound)),
        }
    }

    fn invalidate(&mut self, desc: &RecordDesc, header: &RecordHeader) -> Result<(), T::Error> {
        let page = desc.page as usize;
        let address = self.address(page, desc.offset as usize);
        raw::write_words(&mut self.hal, address, &[header.deleted_word()])?;

        let info = &mut self.pages[page];
        info.valid_records = info.valid_records.saturating_sub(1);
        info.dirty_records += 1;
        info.dirty_words += header.total_words();
        Ok(())
    }

    /// Rebuilds the page table from flash, formatting and repairing pages on the way.
    fn mount(&mut self) -> Result<(), T::Error> {
        let count = self.page_count;
        let mut tags = Vec::with_capacity(count);
        for page in 0..count {
            let mut tag = self.read_tag(page)?;
            if tag == PageTag::Invalid {
                #[cfg(feature = "defmt")]
                warn!("page {} has an invalid tag", page);

                self.erase_page(page)?;
                tag = PageTag::Blank;
            }
            tags.push(tag);
        }

        if tags.iter().all(|tag| *tag == PageTag::Blank) {
            #[cfg(feature = "defmt")]
            debug!("formatting {} pages", count);

            #[cfg(feature = "debug-logs")]
            println!("nor_log: formatting {count} pages");

            for page in 0..count - 1 {
                self.write_tag(page, PAGE_TYPE_DATA)?;
                tags[page] = PageTag::Data;
            }
            self.write_tag(count - 1, PAGE_TYPE_SWAP)?;
            tags[count - 1] = PageTag::Swap;
        }

        // only one swap page survives
        let mut swap = None;
        for page in 0..count {
            if tags[page] != PageTag::Swap {
                continue;
            }
            if swap.is_none() {
                swap = Some(page);
            } else {
                self.erase_page(page)?;
                tags[page] = PageTag::Blank;
            }
        }

        if let Some(page) = swap {
            let address = self.address(page, PAGE_TAG_WORDS);
            let first = raw::read_words(&mut self.hal, address, 1)?;
            if first[0] != BLANK {
                // interrupted garbage collection
                if let Some(blank) = tags.iter().position(|tag| *tag == PageTag::Blank) {
                    // the source was erased already, the swap page holds its records
                    #[cfg(feature = "defmt")]
                    warn!("promoting swap page {} over erased page {}", page, blank);

                    let address = self.address(page, 1);
                    raw::write_words(&mut self.hal, address, &[PAGE_TYPE_DATA])?;
                    tags[page] = PageTag::Data;
                    self.write_tag(blank, PAGE_TYPE_SWAP)?;
                    tags[blank] = PageTag::Swap;
                } else {
                    // the source is intact, discard the partial copy
                    #[cfg(feature = "defmt")]
                    warn!("discarding partial copy in swap page {}", page);

                    self.erase_page(page)?;
                    self.write_tag(page, PAGE_TYPE_SWAP)?;
                }
            }
        } else if let Some(blank) = tags.iter().position(|tag| *tag == PageTag::Blank) {
            self.write_tag(blank, PAGE_TYPE_SWAP)?;
            tags[blank] = PageTag::Swap;
        }

        for page in 0..count {
            if tags[page] == PageTag::Blank {
                self.write_tag(page, PAGE_TYPE_DATA)?;
                tags[page] = PageTag::Data;
            }
        }

        self.pages.clear();
        let mut max_record_id = 0;
        let mut live = Vec::new();
        for (page, tag) in tags.into_iter().enumerate() {
            if tag == PageTag::Swap {
                self.pages.push(PageInfo::swap());
                continue;
            }

            self.pages.push(PageInfo::data());
            let mut offset = PAGE_TAG_WORDS;
            loop {
                match self.read_slot(page, offset)? {
                    Slot::End => break,
                    Slot::Overflow => {
                        let info = &mut self.pages[page];
                        info.dirty_records += 1;
                        info.dirty_words += PAGE_WORDS - offset;
                        offset = PAGE_WORDS;
                        break;
                    }
                    Slot::Record {
                        header,
                        intact,
                        valid,
                        ..
                    } => {
                        if intact {
                            max_record_id = max_record_id.max(header.record_id);
                        }
                        let info = &mut self.pages[page];
                        if valid {
                            info.valid_records += 1;
                            live.push((header, page, offset));
                        } else {
                            info.dirty_records += 1;
                            info.dirty_words += header.total_words();
                        }
                        offset += header.total_words();
                    }
                }
            }
            self.pages[page].write_offset = offset;
        }

        // an update interrupted before the old copy was deleted leaves two valid copies
        live.sort_unstable_by_key(|(header, ..)| (header.file_id, header.key, header.record_id));
        let superseded: Vec<_> = live
            .windows(2)
            .filter(|pair| pair[0].0.file_id == pair[1].0.file_id && pair[0].0.key == pair[1].0.key)
            .map(|pair| pair[0])
            .collect();
        for (header, page, offset) in superseded {
            #[cfg(feature = "defmt")]
            warn!(
                "deleting superseded copy of {:#x}/{:#x} #{}",
                header.file_id, header.key, header.record_id
            );

            let desc = RecordDesc {
                record_id: header.record_id,
                page: page as u16,
                offset: offset as u16,
            };
            self.invalidate(&desc, &header)?;
        }

        self.next_record_id = max_record_id.wrapping_add(1).max(1);
        self.open.clear();

        #[cfg(feature = "debug-logs")]
        println!("nor_log: mounted {:?}", self.statistics());

        Ok(())
    }

    /// Moves the valid records of `source` into the swap page and swaps their roles.
    fn compact(&mut self, source: usize, swap: usize) -> Result<(), T::Error> {
        #[cfg(feature = "defmt")]
        debug!("compacting page {} into {}", source, swap);

        #[cfg(feature = "debug-logs")]
        println!("nor_log: compacting page {source} into {swap}");

        let mut records = Vec::new();
        let mut offset = PAGE_TAG_WORDS;
        while offset < self.pages[source].write_offset {
            match self.read_slot(source, offset)? {
                Slot::End | Slot::Overflow => break,
                Slot::Record {
                    header,
                    data,
                    valid,
                    ..
                } => {
                    offset += header.total_words();
                    if valid {
                        records.push((header, data));
                    }
                }
            }
        }

        self.pages[swap] = PageInfo::swap();
        for (header, data) in &records {
            self.program(swap, header, data)?;
        }

        self.erase_page(source)?;
        let address = self.address(swap, 1);
        raw::write_words(&mut self.hal, address, &[PAGE_TYPE_DATA])?;
        self.pages[swap].role = PageRole::Data;
        self.write_tag(source, PAGE_TYPE_SWAP)?;
        self.pages[source] = PageInfo::swap();

        Ok(())
    }

    fn collect_garbage(&mut self) -> Result<(), T::Error> {
        for source in 0..self.pages.len() {
            let page = &self.pages[source];
            if page.role != PageRole::Data || page.dirty_records == 0 {
                continue;
            }
            if self.open.iter().any(|desc| desc.page as usize == source) {
                #[cfg(feature = "defmt")]
                debug!("page {} has open records, skipped", source);
                continue;
            }

            let Some(swap) = self.pages.iter().position(|page| page.role == PageRole::Swap)
            else {
                break;
            };
            self.compact(source, swap)?;
        }
        Ok(())
    }
}

fn validate(record: &Record<'_>) -> Result<(), FdsError> {
    if record.file_id > FILE_ID_MAX || record.key == 0 || record.key > RECORD_KEY_MAX {
        return Err(FdsError::InvalidArg);
    }
    if record.data.len() > raw::MAX_RECORD_WORDS {
        return Err(FdsError::RecordTooLarge);
    }
    Ok(())
}

fn record_event(
    id: FdsEventId,
    result: Result<(), FdsError>,
    record: &Record<'_>,
    record_id: u32,
) -> FdsEvent {
    FdsEvent {
        id,
        result,
        file_id: record.file_id,
        record_key: record.key,
        record_id,
    }
}

impl<T: Platform> FlashLog for NorFlashLog<T> {
    const MAX_RECORD_WORDS: usize = raw::MAX_RECORD_WORDS;

    fn register(&mut self, handler: Handler) -> Result<(), FdsError> {
        self.handler = Some(handler);
        Ok(())
    }

    fn init(&mut self) -> Result<(), FdsError> {
        if self.handler.is_none() {
            return Err(FdsError::NotInitialized);
        }

        let result = match self.mount() {
            Ok(()) => {
                self.initialized = true;
                Ok(())
            }
            Err(_) => {
                #[cfg(feature = "defmt")]
                warn!("init: flash access failed");

                self.initialized = false;
                Err(FdsError::Internal)
            }
        };

        self.emit(FdsEvent::bare(FdsEventId::Init, result));
        Ok(())
    }

    fn find(
        &mut self,
        file_id: u16,
        key: u16,
        token: &mut FindToken,
    ) -> Result<RecordDesc, FdsError> {
        self.ensure_initialized()?;

        // token.page is one based so a fresh token sorts before every record
        let resume = (token.page as usize, token.offset as usize);
        for page in 0..self.pages.len() {
            if self.pages[page].role != PageRole::Data || page + 1 < resume.0 {
                continue;
            }

            let mut offset = PAGE_TAG_WORDS;
            while offset < self.pages[page].write_offset {
                let slot = self
                    .read_slot(page, offset)
                    .map_err(|_| FdsError::Internal)?;
                let Slot::Record { header, valid, .. } = slot else {
                    break;
                };

                let position = (page + 1, offset);
                if valid && header.file_id == file_id && header.key == key && position > resume {
                    token.page = position.0 as u16;
                    token.offset = position.1 as u16;
                    return Ok(RecordDesc {
                        record_id: header.record_id,
                        page: page as u16,
                        offset: offset as u16,
                    });
                }
                offset += header.total_words();
            }
        }

        Err(FdsError::NotFound)
    }

    fn write(&mut self, record: &Record<'_>) -> Result<RecordDesc, FdsError> {
        self.ensure_initialized()?;
        validate(record)?;

        match self.append(record) {
            Ok(Ok(desc)) => {
                self.emit(record_event(FdsEventId::Write, Ok(()), record, desc.record_id));
                Ok(desc)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.emit(record_event(FdsEventId::Write, Err(FdsError::Internal), record, 0));
                Ok(RecordDesc::default())
            }
        }
    }

    fn update(&mut self, desc: &RecordDesc, record: &Record<'_>) -> Result<RecordDesc, FdsError> {
        self.ensure_initialized()?;
        validate(record)?;

        let old = match self.resolve(desc) {
            Ok(Ok(header)) => header,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(FdsError::Internal),
        };

        let outcome = match self.append(record) {
            Ok(Ok(new)) => self.invalidate(desc, &old).map(|()| Ok(new)),
            other => other,
        };

        match outcome {
            Ok(Ok(new)) => {
                self.emit(record_event(FdsEventId::Update, Ok(()), record, new.record_id));
                Ok(new)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.emit(record_event(
                    FdsEventId::Update,
                    Err(FdsError::Internal),
                    record,
                    desc.record_id,
                ));
                Ok(*desc)
            }
        }
    }

    fn delete(&mut self, desc: &RecordDesc) -> Result<(), FdsError> {
        self.ensure_initialized()?;

        let header = match self.resolve(desc) {
            Ok(Ok(header)) => header,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(FdsError::Internal),
        };

        let result = self
            .invalidate(desc, &header)
            .map_err(|_| FdsError::Internal);
        self.emit(FdsEvent {
            id: FdsEventId::DelRecord,
            result,
            file_id: header.file_id,
            record_key: header.key,
            record_id: header.record_id,
        });
        Ok(())
    }

    fn delete_file(&mut self, file_id: u16) -> Result<(), FdsError> {
        self.ensure_initialized()?;
        if file_id > FILE_ID_MAX {
            return Err(FdsError::InvalidArg);
        }

        let mut result = Ok(());
        'pages: for page in 0..self.pages.len() {
            if self.pages[page].role != PageRole::Data {
                continue;
            }

            let mut offset = PAGE_TAG_WORDS;
            while offset < self.pages[page].write_offset {
                let header = match self.read_slot(page, offset) {
                    Ok(Slot::Record { header, valid, .. }) => {
                        if valid && header.file_id == file_id {
                            let desc = RecordDesc {
                                record_id: header.record_id,
                                page: page as u16,
                                offset: offset as u16,
                            };
                            if self.invalidate(&desc, &header).is_err() {
                                result = Err(FdsError::Internal);
                                break 'pages;
                            }
                        }
                        header
                    }
                    Ok(_) => break,
                    Err(_) => {
                        result = Err(FdsError::Internal);
                        break 'pages;
                    }
                };
                offset += header.total_words();
            }
        }

        self.emit(FdsEvent {
            file_id,
            ..FdsEvent::bare(FdsEventId::DelFile, result)
        });
        Ok(())
    }

    fn gc(&mut self) -> Result<(), FdsError> {
        self.ensure_initialized()?;
        if !self.pages.iter().any(|page| page.role == PageRole::Swap) {
            return Err(FdsError::NoPages);
        }

        let result = match self.collect_garbage() {
            Ok(()) => Ok(()),
            Err(_) => {
                #[cfg(feature = "defmt")]
                warn!("gc: flash access failed, remounting");

                // bring the page table back in line with the flash
                self.initialized = self.mount().is_ok();
                Err(FdsError::Internal)
            }
        };

        #[cfg(feature = "debug-logs")]
        println!("nor_log: gc done {:?}", self.statistics());

        self.emit(FdsEvent::bare(FdsEventId::Gc, result));
        Ok(())
    }

    fn open(&mut self, desc: &RecordDesc) -> Result<FlashRecord, FdsError> {
        self.ensure_initialized()?;

        let page = desc.page as usize;
        if page >= self.pages.len()
            || self.pages[page].role != PageRole::Data
            || (desc.offset as usize) < PAGE_TAG_WORDS
        {
            return Err(FdsError::NotFound);
        }

        let slot = self
            .read_slot(page, desc.offset as usize)
            .map_err(|_| FdsError::Internal)?;
        let Slot::Record {
            header,
            data,
            valid,
            ..
        } = slot
        else {
            return Err(FdsError::NotFound);
        };

        if header.is_deleted() || header.record_id != desc.record_id {
            return Err(FdsError::NotFound);
        }
        if !valid {
            return Err(FdsError::CrcCheckFailed);
        }

        self.open.push(*desc);
        Ok(FlashRecord {
            file_id: header.file_id,
            key: header.key,
            record_id: header.record_id,
            data,
        })
    }

    fn close(&mut self, desc: &RecordDesc) -> Result<(), FdsError> {
        self.ensure_initialized()?;

        let Some(position) = self.open.iter().position(|open| open == desc) else {
            return Err(FdsError::NoOpenRecords);
        };
        self.open.swap_remove(position);
        Ok(())
    }
}
