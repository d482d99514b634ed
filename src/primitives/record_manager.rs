//! # Record Manager
//!
//! Bump allocator for fixed-size cells. The allocation watermark (bytes
//! in use past `cells_offset`) is cached in memory and persisted as an
//! 8-byte little-endian word at file offset 0 by [`sync`](RecordManager::sync),
//! which is the commit point: a crash between allocation and `sync` loses
//! the new records but never corrupts prior state.
//!
//! Records are identified by a zero-based `u32` index. They are never
//! freed; an unlinked record stays allocated and unreachable.

use std::sync::Arc;

use eyre::ensure;
use parking_lot::Mutex;
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Result, StoreError};
use crate::memory::{FileStorage, Memory};
use crate::primitives::link::Link;

/// File offset of the persisted watermark.
const WATERMARK_OFFSET: u64 = 0;

/// Fixed-size cell allocator over a storage region.
#[derive(Debug)]
pub struct RecordManager {
    storage: Arc<FileStorage>,
    cells_offset: u64,
    record_size: u64,
    used: Mutex<u64>,
}

impl RecordManager {
    /// `cells_offset` is where records begin, past the watermark and any
    /// hash-table header. `record_size` is the full cell width.
    pub fn new(storage: Arc<FileStorage>, cells_offset: u64, record_size: u64) -> Self {
        debug_assert!(record_size > 0);
        Self {
            storage,
            cells_offset,
            record_size,
            used: Mutex::new(0),
        }
    }

    pub fn record_size(&self) -> u64 {
        self.record_size
    }

    /// Records allocated so far.
    pub fn count(&self) -> u32 {
        (*self.used.lock() / self.record_size) as u32
    }

    /// Initializes an empty region: zero watermark, no cells.
    pub fn create(&self) -> Result<()> {
        let mut used = self.used.lock();
        self.storage.resize(self.cells_offset)?;
        self.write_watermark(0)?;
        *used = 0;
        Ok(())
    }

    /// Reads and caches the persisted watermark, validating it against
    /// the file.
    pub fn start(&self) -> Result<()> {
        let mut used = self.used.lock();
        let stored = self.read_watermark()?;

        if stored % self.record_size != 0 {
            return Err(StoreError::CorruptHeader(format!(
                "'{}' watermark {} is not a multiple of the record size {}",
                self.storage.path().display(),
                stored,
                self.record_size
            ))
            .into());
        }

        if self.cells_offset + stored > self.storage.size() {
            return Err(StoreError::CorruptHeader(format!(
                "'{}' watermark {} overruns the file ({} bytes)",
                self.storage.path().display(),
                stored,
                self.storage.size()
            ))
            .into());
        }

        *used = stored;
        Ok(())
    }

    /// Persists the cached watermark, committing every allocation made
    /// since the last `sync`.
    pub fn sync(&self) -> Result<()> {
        let used = self.used.lock();
        self.write_watermark(*used)
    }

    /// Allocates `count` contiguous records and returns the first link.
    /// On storage failure the watermark is left at its prior value.
    pub fn new_records(&self, count: u32) -> Result<u32> {
        ensure!(count > 0, "cannot allocate zero records");

        let mut used = self.used.lock();
        let first = *used / self.record_size;
        let last = first + count as u64;

        // The all-ones link is the absent sentinel and must stay unused.
        if last >= u32::NOT_FOUND.to_u64() {
            return Err(StoreError::CapacityExhausted(last).into());
        }

        let new_used = *used + count as u64 * self.record_size;
        self.storage.resize(self.cells_offset + new_used)?;
        *used = new_used;

        Ok(first as u32)
    }

    /// Accessor positioned at the start of the given record.
    pub fn get(&self, link: u32) -> Result<Memory<'_>> {
        self.get_at(link, 0)
    }

    /// Accessor positioned `delta` bytes into the given record.
    pub(crate) fn get_at(&self, link: u32, delta: u64) -> Result<Memory<'_>> {
        debug_assert!(delta < self.record_size);

        let used = *self.used.lock();
        let start = link as u64 * self.record_size;

        if link == u32::NOT_FOUND || start + self.record_size > used {
            return Err(StoreError::InvalidLink(link as u64).into());
        }

        self.storage.access(self.cells_offset + start + delta)
    }

    fn read_watermark(&self) -> Result<u64> {
        let memory = self.storage.access(WATERMARK_OFFSET)?;
        let buffer = memory.buffer();

        if buffer.len() < 8 {
            return Err(StoreError::CorruptHeader(format!(
                "'{}' is too short to hold a watermark",
                self.storage.path().display()
            ))
            .into());
        }

        let word = U64::ref_from_bytes(&buffer[..8])
            .map_err(|error| eyre::eyre!("failed to parse watermark: {:?}", error))?;
        Ok(word.get())
    }

    fn write_watermark(&self, used: u64) -> Result<()> {
        let memory = self.storage.access(WATERMARK_OFFSET)?;
        memory.write_bytes(0, U64::new(used).as_bytes());
        Ok(())
    }
}
