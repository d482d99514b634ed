//! # Spend Database
//!
//! A simple map from an output point to the input point that spends it,
//! over a single record hash table file. Both sides are 36-byte
//! serialized points (32-byte transaction hash plus 4-byte index); the
//! engine treats them as opaque.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::memory::FileStorage;
use crate::primitives::{
    HashTableHeader, RecordHashTable, RecordManager, TABLE_HEADER_OFFSET,
};

/// Serialized point width: 32-byte hash + 4-byte index.
pub const POINT_SIZE: usize = 36;

/// Load statistics: `rows / buckets` is the table's load factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendStatInfo {
    pub buckets: u32,
    pub rows: u32,
}

/// Lookup of the spend of an output point.
#[derive(Debug)]
pub struct SpendDatabase {
    storage: Arc<FileStorage>,
    table: RecordHashTable<POINT_SIZE>,
}

impl SpendDatabase {
    pub fn new<P: AsRef<Path>>(path: P, buckets: u32, growth_rate: u16) -> Result<Self> {
        let storage = Arc::new(FileStorage::open(path, growth_rate)?);

        let header = HashTableHeader::<u32>::new(storage.clone(), buckets);
        let cells_offset = TABLE_HEADER_OFFSET + HashTableHeader::<u32>::size(buckets);
        let manager = RecordManager::new(
            storage.clone(),
            cells_offset,
            RecordHashTable::<POINT_SIZE>::record_size(POINT_SIZE),
        );
        let table = RecordHashTable::new(header, manager)?;

        Ok(Self { storage, table })
    }

    /// Initializes a new spend database.
    pub fn create(&self) -> Result<()> {
        self.table.create()?;
        self.table.sync()
    }

    /// Validates the persisted state before use.
    pub fn open(&self) -> Result<()> {
        self.table.start()
    }

    /// Persists the allocation watermark.
    pub fn commit(&self) -> Result<()> {
        self.table.sync()
    }

    /// Writes dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()
    }

    /// Unmaps and truncates the backing file.
    pub fn close(&self) -> Result<()> {
        self.storage.close()
    }

    /// Records the spend of `outpoint` by `inpoint`.
    pub fn store(&self, outpoint: &[u8; POINT_SIZE], inpoint: &[u8; POINT_SIZE]) -> Result<()> {
        self.table
            .store(outpoint, |value| value.extend_from_slice(inpoint))?;
        Ok(())
    }

    /// The input point that spent `outpoint`, if any.
    pub fn get(&self, outpoint: &[u8; POINT_SIZE]) -> Result<Option<[u8; POINT_SIZE]>> {
        let Some(memory) = self.table.find(outpoint)? else {
            return Ok(None);
        };

        let mut inpoint = [0u8; POINT_SIZE];
        inpoint.copy_from_slice(&memory.buffer()[..POINT_SIZE]);
        Ok(Some(inpoint))
    }

    /// Removes the spend of `outpoint`. Requires the
    /// single-structural-writer discipline.
    pub fn unlink(&self, outpoint: &[u8; POINT_SIZE]) -> Result<bool> {
        self.table.unlink(outpoint)
    }

    pub fn statinfo(&self) -> SpendStatInfo {
        SpendStatInfo {
            buckets: self.table.buckets(),
            rows: self.table.count(),
        }
    }
}
