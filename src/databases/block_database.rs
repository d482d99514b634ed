//! # Block Database
//!
//! Blocks by hash over a slab hash table, plus two append-only height
//! indexes over separate files: the confirmed index and the header
//! (candidate) index. A stored slab is `[height: u32 | len: u32 |
//! payload]`; the payload is the caller's serialized block or header,
//! opaque to the engine.
//!
//! A block becomes reachable by height only once it is indexed; `store`
//! alone publishes it by hash. Index records hold the slab's file offset,
//! and a record's position in the index is the height it confirms.

use std::path::Path;
use std::sync::Arc;

use crate::databases::{parse_le_u32, parse_le_u64};
use crate::error::Result;
use crate::memory::{FileStorage, Memory};
use crate::primitives::{
    HashTableHeader, RecordManager, SlabHashTable, SlabManager, TABLE_HEADER_OFFSET, WATERMARK_SIZE,
};

/// Block hash width.
pub const HASH_SIZE: usize = 32;

/// Slab prefix: height, payload length.
const SLAB_PREFIX: usize = 8;

/// Index record: one slab offset.
const INDEX_RECORD_SIZE: u64 = 8;

/// A located block: its height and serialized bytes.
pub struct BlockResult<'a> {
    memory: Memory<'a>,
    height: u32,
    size: u32,
}

impl BlockResult<'_> {
    fn parse(memory: Memory<'_>) -> Result<BlockResult<'_>> {
        let buffer = memory.buffer();
        let height = parse_le_u32(buffer)?;
        let size = parse_le_u32(&buffer[4..])?;
        Ok(BlockResult {
            memory,
            height,
            size,
        })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The serialized block.
    pub fn bytes(&self) -> &[u8] {
        &self.memory.buffer()[SLAB_PREFIX..SLAB_PREFIX + self.size as usize]
    }
}

/// Blocks by hash and by height.
#[derive(Debug)]
pub struct BlockDatabase {
    table_storage: Arc<FileStorage>,
    index_storage: Arc<FileStorage>,
    header_storage: Arc<FileStorage>,
    table: SlabHashTable<HASH_SIZE>,
    index: RecordManager,
    header_index: RecordManager,
}

impl BlockDatabase {
    pub fn new<P: AsRef<Path>>(
        table_path: P,
        index_path: P,
        header_index_path: P,
        buckets: u32,
        growth_rate: u16,
    ) -> Result<Self> {
        let table_storage = Arc::new(FileStorage::open(table_path, growth_rate)?);
        let index_storage = Arc::new(FileStorage::open(index_path, growth_rate)?);
        let header_storage = Arc::new(FileStorage::open(header_index_path, growth_rate)?);

        let header = HashTableHeader::<u64>::new(table_storage.clone(), buckets);
        let cells_offset = TABLE_HEADER_OFFSET + HashTableHeader::<u64>::size(buckets);
        let manager = SlabManager::new(table_storage.clone(), cells_offset);
        let table = SlabHashTable::new(header, manager);

        let index = RecordManager::new(index_storage.clone(), WATERMARK_SIZE, INDEX_RECORD_SIZE);
        let header_index =
            RecordManager::new(header_storage.clone(), WATERMARK_SIZE, INDEX_RECORD_SIZE);

        Ok(Self {
            table_storage,
            index_storage,
            header_storage,
            table,
            index,
            header_index,
        })
    }

    pub fn create(&self) -> Result<()> {
        self.table.create()?;
        self.index.create()?;
        self.header_index.create()?;
        self.commit()
    }

    pub fn open(&self) -> Result<()> {
        self.table.start()?;
        self.index.start()?;
        self.header_index.start()
    }

    /// Persists all three watermarks.
    pub fn commit(&self) -> Result<()> {
        self.table.sync()?;
        self.index.sync()?;
        self.header_index.sync()
    }

    pub fn flush(&self) -> Result<()> {
        self.table_storage.flush()?;
        self.index_storage.flush()?;
        self.header_storage.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.table_storage.close()?;
        self.index_storage.close()?;
        self.header_storage.close()
    }

    /// Stores a block under its hash. Returns the slab offset; the block
    /// is not yet reachable by height.
    pub fn store(&self, hash: &[u8; HASH_SIZE], height: u32, block: &[u8]) -> Result<u64> {
        let size = (SLAB_PREFIX + block.len()) as u64;
        self.table.store(hash, size, |value| {
            value.extend_from_slice(&height.to_le_bytes());
            value.extend_from_slice(&(block.len() as u32).to_le_bytes());
            value.extend_from_slice(block);
        })
    }

    /// Appends a stored block to the confirmed index. Returns the height
    /// it now confirms.
    pub fn index(&self, offset: u64) -> Result<u32> {
        Self::append(&self.index, offset)
    }

    /// Appends a stored header to the header index.
    pub fn index_header(&self, offset: u64) -> Result<u32> {
        Self::append(&self.header_index, offset)
    }

    /// The most recently stored block under `hash`.
    pub fn get(&self, hash: &[u8; HASH_SIZE]) -> Result<Option<BlockResult<'_>>> {
        let Some(memory) = self.table.find(hash)? else {
            return Ok(None);
        };
        Ok(Some(BlockResult::parse(memory)?))
    }

    /// Slab offset of the most recently stored block under `hash`.
    pub fn offset(&self, hash: &[u8; HASH_SIZE]) -> Result<Option<u64>> {
        self.table.offset(hash)
    }

    /// The confirmed block at `height`.
    pub fn get_by_height(&self, height: u32) -> Result<BlockResult<'_>> {
        Self::lookup(&self.index, &self.table, height)
    }

    /// The header at `height` in the header index.
    pub fn get_header_by_height(&self, height: u32) -> Result<BlockResult<'_>> {
        Self::lookup(&self.header_index, &self.table, height)
    }

    /// Top of the confirmed index, or `None` when empty.
    pub fn height(&self) -> Option<u32> {
        self.index.count().checked_sub(1)
    }

    /// Top of the header index, or `None` when empty.
    pub fn header_height(&self) -> Option<u32> {
        self.header_index.count().checked_sub(1)
    }

    fn append(index: &RecordManager, offset: u64) -> Result<u32> {
        let record = index.new_records(1)?;
        let memory = index.get(record)?;
        memory.write_bytes(0, &offset.to_le_bytes());
        Ok(record)
    }

    fn lookup<'a>(
        index: &RecordManager,
        table: &'a SlabHashTable<HASH_SIZE>,
        height: u32,
    ) -> Result<BlockResult<'a>> {
        let offset = {
            let memory = index.get(height)?;
            parse_le_u64(memory.buffer())?
        };
        BlockResult::parse(table.get(offset)?)
    }
}
