//! # History Database
//!
//! Payment history per address over a record multimap: the lookup table
//! maps a 20-byte address hash to its newest row, and rows chain through
//! a separate file. Each row carries 48 opaque bytes written by the
//! caller, enough for a serialized point, a height, and a value.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::memory::FileStorage;
use crate::primitives::{
    HashTableHeader, RecordHashTable, RecordManager, RecordMultimap, TABLE_HEADER_OFFSET,
    WATERMARK_SIZE,
};

/// Address short-hash width.
pub const ADDRESS_SIZE: usize = 20;

/// Opaque row payload width.
pub const ROW_VALUE_SIZE: usize = 48;

/// Load statistics: `rows / buckets` is the lookup table's load factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStatInfo {
    pub buckets: u32,
    pub rows: u32,
}

/// Address histories, newest-first.
#[derive(Debug)]
pub struct HistoryDatabase {
    table_storage: Arc<FileStorage>,
    rows_storage: Arc<FileStorage>,
    multimap: RecordMultimap<ADDRESS_SIZE>,
}

impl HistoryDatabase {
    pub fn new<P: AsRef<Path>>(
        table_path: P,
        rows_path: P,
        buckets: u32,
        growth_rate: u16,
    ) -> Result<Self> {
        let table_storage = Arc::new(FileStorage::open(table_path, growth_rate)?);
        let rows_storage = Arc::new(FileStorage::open(rows_path, growth_rate)?);

        let header = HashTableHeader::<u32>::new(table_storage.clone(), buckets);
        let cells_offset = TABLE_HEADER_OFFSET + HashTableHeader::<u32>::size(buckets);
        let manager = RecordManager::new(
            table_storage.clone(),
            cells_offset,
            RecordHashTable::<ADDRESS_SIZE>::record_size(
                RecordMultimap::<ADDRESS_SIZE>::MAP_VALUE_SIZE,
            ),
        );
        let map = RecordHashTable::new(header, manager)?;

        let rows = RecordManager::new(
            rows_storage.clone(),
            WATERMARK_SIZE,
            RecordMultimap::<ADDRESS_SIZE>::row_size(ROW_VALUE_SIZE),
        );
        let multimap = RecordMultimap::new(map, rows)?;

        Ok(Self {
            table_storage,
            rows_storage,
            multimap,
        })
    }

    pub fn create(&self) -> Result<()> {
        self.multimap.create()?;
        self.multimap.sync()
    }

    pub fn open(&self) -> Result<()> {
        self.multimap.start()
    }

    /// Persists both watermarks.
    pub fn commit(&self) -> Result<()> {
        self.multimap.sync()
    }

    pub fn flush(&self) -> Result<()> {
        self.table_storage.flush()?;
        self.rows_storage.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.table_storage.close()?;
        self.rows_storage.close()
    }

    /// Appends a history row for `address`. The writer must fill exactly
    /// [`ROW_VALUE_SIZE`] bytes.
    pub fn store(
        &self,
        address: &[u8; ADDRESS_SIZE],
        write: impl FnOnce(&mut Vec<u8>),
    ) -> Result<()> {
        self.multimap.store(address, write)?;
        Ok(())
    }

    /// The rows for `address`, newest first, up to `limit` when given.
    pub fn get(
        &self,
        address: &[u8; ADDRESS_SIZE],
        limit: Option<usize>,
    ) -> Result<Vec<[u8; ROW_VALUE_SIZE]>> {
        let mut rows = Vec::new();
        let mut current = self.multimap.find(address)?;

        while let Some(link) = current {
            if limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }

            let mut row = [0u8; ROW_VALUE_SIZE];
            {
                let memory = self.multimap.get(link)?;
                row.copy_from_slice(&memory.buffer()[..ROW_VALUE_SIZE]);
            }
            rows.push(row);

            current = self.multimap.next(link)?;
        }

        Ok(rows)
    }

    /// Pops the newest row for `address`; the mapping disappears with its
    /// last row. Requires the single-structural-writer discipline.
    pub fn unlink(&self, address: &[u8; ADDRESS_SIZE]) -> Result<bool> {
        self.multimap.unlink(address)
    }

    pub fn statinfo(&self) -> HistoryStatInfo {
        HistoryStatInfo {
            buckets: self.multimap.buckets(),
            rows: self.multimap.rows(),
        }
    }
}
