//! # Transaction Database
//!
//! Transactions by hash over a slab hash table, with an append-only
//! arrival-order index of slab offsets alongside. A stored slab is
//! `[height: u32 | position: u32 | len: u32 | payload]`; the payload is
//! the caller's serialized transaction, opaque to the engine.

use std::path::Path;
use std::sync::Arc;

use crate::databases::parse_le_u32;
use crate::error::Result;
use crate::memory::{FileStorage, Memory};
use crate::primitives::{
    HashTableHeader, RecordManager, SlabHashTable, SlabManager, TABLE_HEADER_OFFSET, WATERMARK_SIZE,
};

/// Transaction hash width.
pub const HASH_SIZE: usize = 32;

/// Slab prefix: height, position, payload length.
const SLAB_PREFIX: usize = 12;

/// Index record: one slab offset.
const INDEX_RECORD_SIZE: u64 = 8;

/// A located transaction: metadata plus its serialized bytes.
pub struct TransactionResult<'a> {
    memory: Memory<'a>,
    height: u32,
    position: u32,
    size: u32,
}

impl TransactionResult<'_> {
    fn parse(memory: Memory<'_>) -> Result<TransactionResult<'_>> {
        let buffer = memory.buffer();
        let height = parse_le_u32(buffer)?;
        let position = parse_le_u32(&buffer[4..])?;
        let size = parse_le_u32(&buffer[8..])?;
        Ok(TransactionResult {
            memory,
            height,
            position,
            size,
        })
    }

    /// Height of the confirming block.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Position within the confirming block.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// The serialized transaction.
    pub fn bytes(&self) -> &[u8] {
        &self.memory.buffer()[SLAB_PREFIX..SLAB_PREFIX + self.size as usize]
    }
}

/// Transactions by hash, with arrival-order iteration.
#[derive(Debug)]
pub struct TransactionDatabase {
    table_storage: Arc<FileStorage>,
    index_storage: Arc<FileStorage>,
    table: SlabHashTable<HASH_SIZE>,
    index: RecordManager,
}

impl TransactionDatabase {
    pub fn new<P: AsRef<Path>>(
        table_path: P,
        index_path: P,
        buckets: u32,
        growth_rate: u16,
    ) -> Result<Self> {
        let table_storage = Arc::new(FileStorage::open(table_path, growth_rate)?);
        let index_storage = Arc::new(FileStorage::open(index_path, growth_rate)?);

        let header = HashTableHeader::<u64>::new(table_storage.clone(), buckets);
        let cells_offset = TABLE_HEADER_OFFSET + HashTableHeader::<u64>::size(buckets);
        let manager = SlabManager::new(table_storage.clone(), cells_offset);
        let table = SlabHashTable::new(header, manager);

        let index = RecordManager::new(index_storage.clone(), WATERMARK_SIZE, INDEX_RECORD_SIZE);

        Ok(Self {
            table_storage,
            index_storage,
            table,
            index,
        })
    }

    pub fn create(&self) -> Result<()> {
        self.table.create()?;
        self.index.create()?;
        self.commit()
    }

    pub fn open(&self) -> Result<()> {
        self.table.start()?;
        self.index.start()
    }

    /// Persists both watermarks.
    pub fn commit(&self) -> Result<()> {
        self.table.sync()?;
        self.index.sync()
    }

    pub fn flush(&self) -> Result<()> {
        self.table_storage.flush()?;
        self.index_storage.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.table_storage.close()?;
        self.index_storage.close()
    }

    /// Stores a transaction and appends it to the arrival index. Returns
    /// the slab offset.
    pub fn store(
        &self,
        hash: &[u8; HASH_SIZE],
        height: u32,
        position: u32,
        transaction: &[u8],
    ) -> Result<u64> {
        let size = (SLAB_PREFIX + transaction.len()) as u64;
        let offset = self.table.store(hash, size, |value| {
            value.extend_from_slice(&height.to_le_bytes());
            value.extend_from_slice(&position.to_le_bytes());
            value.extend_from_slice(&(transaction.len() as u32).to_le_bytes());
            value.extend_from_slice(transaction);
        })?;

        let record = self.index.new_records(1)?;
        let memory = self.index.get(record)?;
        memory.write_bytes(0, &offset.to_le_bytes());

        Ok(offset)
    }

    /// The most recently stored transaction under `hash`.
    pub fn get(&self, hash: &[u8; HASH_SIZE]) -> Result<Option<TransactionResult<'_>>> {
        let Some(memory) = self.table.find(hash)? else {
            return Ok(None);
        };
        Ok(Some(TransactionResult::parse(memory)?))
    }

    /// Transactions stored, in arrival order.
    pub fn count(&self) -> u32 {
        self.index.count()
    }

    /// The `number`th stored transaction (zero-based arrival order).
    pub fn get_by_number(&self, number: u32) -> Result<TransactionResult<'_>> {
        let offset = {
            let memory = self.index.get(number)?;
            crate::databases::parse_le_u64(memory.buffer())?
        };
        TransactionResult::parse(self.table.get(offset)?)
    }
}
