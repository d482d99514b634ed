//! # Slab Manager
//!
//! Bump allocator for variable-size cells. A slab's identity is its byte
//! offset from the start of the file, so offset 0 (inside the watermark)
//! can never name a slab and the all-ones `u64` is the only sentinel.
//!
//! The watermark and commit discipline match the record manager: an
//! 8-byte little-endian word at file offset 0, persisted by `sync`.

use std::sync::Arc;

use eyre::ensure;
use parking_lot::Mutex;
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Result, StoreError};
use crate::memory::{FileStorage, Memory};
use crate::primitives::link::Link;

const WATERMARK_OFFSET: u64 = 0;

/// Variable-size cell allocator over a storage region.
#[derive(Debug)]
pub struct SlabManager {
    storage: Arc<FileStorage>,
    cells_offset: u64,
    used: Mutex<u64>,
}

impl SlabManager {
    /// `cells_offset` is where slabs begin, past the watermark and any
    /// hash-table header.
    pub fn new(storage: Arc<FileStorage>, cells_offset: u64) -> Self {
        Self {
            storage,
            cells_offset,
            used: Mutex::new(0),
        }
    }

    /// Bytes allocated past the cells offset.
    pub fn payload_size(&self) -> u64 {
        *self.used.lock()
    }

    /// Initializes an empty region: zero watermark, no slabs.
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

    /// Persists the cached watermark, the commit point.
    pub fn sync(&self) -> Result<()> {
        let used = self.used.lock();
        self.write_watermark(*used)
    }

    /// Allocates `size` bytes and returns the slab's file offset. On
    /// storage failure the watermark is left at its prior value.
    pub fn new_slab(&self, size: u64) -> Result<u64> {
        ensure!(size > 0, "cannot allocate an empty slab");

        let mut used = self.used.lock();
        let offset = self.cells_offset + *used;

        let new_used = *used + size;
        self.storage.resize(self.cells_offset + new_used)?;
        *used = new_used;

        Ok(offset)
    }

    /// Accessor positioned at the given file offset, which must fall
    /// inside the allocated slab area.
    pub fn get(&self, offset: u64) -> Result<Memory<'_>> {
        let used = *self.used.lock();

        if offset == u64::NOT_FOUND || offset < self.cells_offset || offset >= self.cells_offset + used
        {
            return Err(StoreError::InvalidLink(offset).into());
        }

        self.storage.access(offset)
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_storage(dir: &tempfile::TempDir) -> Arc<FileStorage> {
        let path = dir.path().join("slabs");
        FileStorage::create(&path).unwrap();
        Arc::new(FileStorage::open(&path, 50).unwrap())
    }

    #[test]
    fn slabs_are_addressed_by_file_offset() {
        let dir = tempdir().unwrap();
        let manager = SlabManager::new(open_storage(&dir), 8);
        manager.create().unwrap();

        let first = manager.new_slab(10).unwrap();
        let second = manager.new_slab(3).unwrap();
        assert_eq!(first, 8);
        assert_eq!(second, 18);
        assert_eq!(manager.payload_size(), 13);

        let memory = manager.get(second).unwrap();
        memory.write_bytes(0, &[1, 2, 3]);
        assert_eq!(&memory.buffer()[..3], &[1, 2, 3]);
    }

    #[test]
    fn get_outside_allocation_fails() {
        let dir = tempdir().unwrap();
        let manager = SlabManager::new(open_storage(&dir), 8);
        manager.create().unwrap();
        manager.new_slab(4).unwrap();

        for bad in [0, 7, 12, u64::NOT_FOUND] {
            let err = manager.get(bad).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<StoreError>(),
                Some(StoreError::InvalidLink(_))
            ));
        }
    }
}
