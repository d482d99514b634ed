//! # Slab Hash Table
//!
//! A chained hash table of variable-size cells `[key | next: u64 |
//! payload]`, joining a [`HashTableHeader`] with a [`SlabManager`]. Cells
//! are identified by their byte offset in the file. Insert, lookup, and
//! unlink semantics match the record variant; the locking model is
//! identical (see `record_hash_table`).
//!
//! The table does not persist payload sizes: callers reserve a size at
//! `store` and derive it from their own payload encoding on read.

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};

use crate::error::{Result, StoreError};
use crate::memory::Memory;
use crate::primitives::link::{load_link, store_link, Link};
use crate::primitives::{HashTableHeader, SlabManager};

/// Width of the in-cell next link.
const LINK_SIZE: usize = 8;

/// Chained hash table over variable-size slabs, keyed by `K`-byte arrays.
#[derive(Debug)]
pub struct SlabHashTable<const K: usize> {
    header: HashTableHeader<u64>,
    manager: SlabManager,
    create_lock: Mutex<()>,
    update_lock: RwLock<()>,
}

impl<const K: usize> SlabHashTable<K> {
    /// Joins a header and a slab manager into a table.
    pub fn new(header: HashTableHeader<u64>, manager: SlabManager) -> Self {
        Self {
            header,
            manager,
            create_lock: Mutex::new(()),
            update_lock: RwLock::new(()),
        }
    }

    /// Buckets in the header, for load-factor statistics.
    pub fn buckets(&self) -> u32 {
        self.header.buckets()
    }

    /// Initializes header and manager in a fresh file.
    pub fn create(&self) -> Result<()> {
        self.header.create()?;
        self.manager.create()
    }

    /// Validates header and watermark in an existing file.
    pub fn start(&self) -> Result<()> {
        self.header.start()?;
        self.manager.start()
    }

    /// Persists the allocation watermark (the commit point).
    pub fn sync(&self) -> Result<()> {
        self.manager.sync()
    }

    /// Inserts a cell at the head of its bucket's chain, reserving
    /// `value_size` payload bytes. The writer must fill exactly that many
    /// or the cell is abandoned unreachable and `ShortWrite` returned.
    /// Returns the new cell's file offset.
    pub fn store(
        &self,
        key: &[u8; K],
        value_size: u64,
        write: impl FnOnce(&mut Vec<u8>),
    ) -> Result<u64> {
        let value = serialize(value_size as usize, write)?;

        let offset = self.manager.new_slab((K + LINK_SIZE) as u64 + value_size)?;
        {
            let memory = self.manager.get(offset)?;
            memory.write_bytes(0, key);
            memory.write_bytes(K + LINK_SIZE, &value);
        }

        // The critical section: chain the cell to the current head, then
        // publish it as the new head.
        let bucket = self.header.bucket_of(key);
        let _create = self.create_lock.lock();
        let head = self.header.read(bucket)?;
        {
            let memory = self.manager.get(offset)?;
            store_link(head, &memory, K);
        }
        self.header.write(bucket, offset)?;

        Ok(offset)
    }

    /// File offset of the most recently stored cell matching `key`.
    pub fn offset(&self, key: &[u8; K]) -> Result<Option<u64>> {
        let bucket = self.header.bucket_of(key);
        let mut current = {
            let _shared = self.update_lock.read();
            self.header.read(bucket)?
        };

        while current != u64::NOT_FOUND {
            let memory = self.manager.get(current)?;
            if &memory.buffer()[..K] == key {
                return Ok(Some(current));
            }
            let next = {
                let _shared = self.update_lock.read();
                load_link::<u64>(&memory, K)
            };
            drop(memory);
            current = next;
        }

        Ok(None)
    }

    /// Payload bytes of the most recently stored cell matching `key`.
    pub fn find(&self, key: &[u8; K]) -> Result<Option<Memory<'_>>> {
        match self.offset(key)? {
            Some(offset) => Ok(Some(self.get(offset)?)),
            None => Ok(None),
        }
    }

    /// Payload bytes of the cell at `offset`, bypassing key lookup.
    pub fn get(&self, offset: u64) -> Result<Memory<'_>> {
        self.manager.get(offset + (K + LINK_SIZE) as u64)
    }

    /// Overwrites the payload of the first match in place with the same
    /// reserved size. Chain topology is untouched. Requires the
    /// single-structural-writer discipline.
    pub fn update(
        &self,
        key: &[u8; K],
        value_size: u64,
        write: impl FnOnce(&mut Vec<u8>),
    ) -> Result<Option<u64>> {
        let value = serialize(value_size as usize, write)?;

        let Some(offset) = self.offset(key)? else {
            return Ok(None);
        };

        let memory = self.get(offset)?;
        let _write = self.update_lock.write();
        memory.write_bytes(0, &value);

        Ok(Some(offset))
    }

    /// Removes the first match by rewriting its predecessor's link (or
    /// the bucket head). The cell's storage is leaked. Requires the
    /// single-structural-writer discipline.
    pub fn unlink(&self, key: &[u8; K]) -> Result<bool> {
        let bucket = self.header.bucket_of(key);
        let guard = self.update_lock.upgradable_read();

        let mut previous: Option<u64> = None;
        let mut current = self.header.read(bucket)?;

        while current != u64::NOT_FOUND {
            let memory = self.manager.get(current)?;
            let next = load_link::<u64>(&memory, K);

            if &memory.buffer()[..K] == key {
                drop(memory);
                return match previous {
                    None => {
                        let _write = RwLockUpgradableReadGuard::upgrade(guard);
                        self.header.write(bucket, next)?;
                        Ok(true)
                    }
                    Some(offset) => {
                        let memory = self.manager.get(offset)?;
                        let _write = RwLockUpgradableReadGuard::upgrade(guard);
                        store_link(next, &memory, K);
                        Ok(true)
                    }
                };
            }

            drop(memory);
            previous = Some(current);
            current = next;
        }

        Ok(false)
    }
}

fn serialize(reserved: usize, write: impl FnOnce(&mut Vec<u8>)) -> Result<Vec<u8>> {
    let mut value = Vec::with_capacity(reserved);
    write(&mut value);

    if value.len() != reserved {
        return Err(StoreError::ShortWrite {
            reserved,
            written: value.len(),
        }
        .into());
    }

    Ok(value)
}
