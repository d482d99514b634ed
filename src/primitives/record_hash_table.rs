//! # Record Hash Table
//!
//! A chained hash table of fixed-size cells `[key | next: u32 | value]`,
//! joining a [`HashTableHeader`] with a [`RecordManager`]. Inserts are
//! LIFO at the bucket head, so duplicates are allowed and the most recent
//! shadows the rest until it is unlinked.
//!
//! ## Locking
//!
//! - The *create* lock serializes the head-of-bucket push in `store`;
//!   concurrent `store`s are safe, and readers are never blocked by it.
//! - The *update* lock guards chain-pointer rewrites: `unlink` walks under
//!   an upgradable read and upgrades for the single link-word store;
//!   readers hold it shared while crossing each link.
//! - `update` and `unlink` assume one structural writer per table. Many
//!   readers are fine; callers must not run them against a concurrent
//!   `store` on the same table.
//!
//! Unlinked cells are leaked: space is traded for crash safety and
//! write simplicity.

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};

use crate::error::{Result, StoreError};
use crate::memory::Memory;
use crate::primitives::link::{load_link, store_link, Link};
use crate::primitives::{HashTableHeader, RecordManager};

/// Width of the in-cell next link.
const LINK_SIZE: usize = 4;

/// Chained hash table over fixed-size records, keyed by `K`-byte arrays.
#[derive(Debug)]
pub struct RecordHashTable<const K: usize> {
    header: HashTableHeader<u32>,
    manager: RecordManager,
    value_size: usize,
    create_lock: Mutex<()>,
    update_lock: RwLock<()>,
}

impl<const K: usize> RecordHashTable<K> {
    /// Full cell width for a given value size.
    pub fn record_size(value_size: usize) -> u64 {
        (K + LINK_SIZE + value_size) as u64
    }

    /// Joins a header and a record manager into a table. The manager's
    /// record size must cover key, link, and at least one value byte.
    pub fn new(header: HashTableHeader<u32>, manager: RecordManager) -> Result<Self> {
        let overhead = (K + LINK_SIZE) as u64;
        eyre::ensure!(
            manager.record_size() > overhead,
            "record size {} leaves no value bytes after {} bytes of key and link",
            manager.record_size(),
            overhead
        );

        let value_size = (manager.record_size() - overhead) as usize;
        Ok(Self {
            header,
            manager,
            value_size,
            create_lock: Mutex::new(()),
            update_lock: RwLock::new(()),
        })
    }

    /// Value bytes per cell.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Buckets in the header, for load-factor statistics.
    pub fn buckets(&self) -> u32 {
        self.header.buckets()
    }

    /// Cells allocated, reachable or not.
    pub fn count(&self) -> u32 {
        self.manager.count()
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

    /// Inserts a cell at the head of its bucket's chain. The writer must
    /// fill exactly [`value_size`](Self::value_size) bytes or the cell is
    /// abandoned unreachable and `ShortWrite` returned.
    pub fn store(&self, key: &[u8; K], write: impl FnOnce(&mut Vec<u8>)) -> Result<u32> {
        let value = self.serialize(write)?;

        let link = self.manager.new_records(1)?;
        {
            let memory = self.manager.get(link)?;
            memory.write_bytes(0, key);
            memory.write_bytes(K + LINK_SIZE, &value);
        }

        // The critical section: chain the cell to the current head, then
        // publish it as the new head.
        let bucket = self.header.bucket_of(key);
        let _create = self.create_lock.lock();
        let head = self.header.read(bucket)?;
        {
            let memory = self.manager.get(link)?;
            store_link(head, &memory, K);
        }
        self.header.write(bucket, link)?;

        Ok(link)
    }

    /// Link of the most recently stored cell matching `key`.
    pub fn link(&self, key: &[u8; K]) -> Result<Option<u32>> {
        let bucket = self.header.bucket_of(key);
        let mut current = {
            let _shared = self.update_lock.read();
            self.header.read(bucket)?
        };

        while current != u32::NOT_FOUND {
            let memory = self.manager.get(current)?;
            if &memory.buffer()[..K] == key {
                return Ok(Some(current));
            }
            let next = {
                let _shared = self.update_lock.read();
                load_link::<u32>(&memory, K)
            };
            drop(memory);
            current = next;
        }

        Ok(None)
    }

    /// Value bytes of the most recently stored cell matching `key`.
    pub fn find(&self, key: &[u8; K]) -> Result<Option<Memory<'_>>> {
        match self.link(key)? {
            Some(link) => Ok(Some(self.get(link)?)),
            None => Ok(None),
        }
    }

    /// Value bytes of the cell at `link`, bypassing key lookup.
    pub fn get(&self, link: u32) -> Result<Memory<'_>> {
        self.manager.get_at(link, (K + LINK_SIZE) as u64)
    }

    /// Overwrites the value of the first match in place. Chain topology
    /// is untouched. Requires the single-structural-writer discipline.
    pub fn update(&self, key: &[u8; K], write: impl FnOnce(&mut Vec<u8>)) -> Result<Option<u32>> {
        let value = self.serialize(write)?;

        let Some(link) = self.link(key)? else {
            return Ok(None);
        };

        let memory = self.manager.get_at(link, (K + LINK_SIZE) as u64)?;
        let _write = self.update_lock.write();
        memory.write_bytes(0, &value);

        Ok(Some(link))
    }

    /// Removes the first match by rewriting its predecessor's link (or
    /// the bucket head). The cell's storage is leaked. Requires the
    /// single-structural-writer discipline.
    pub fn unlink(&self, key: &[u8; K]) -> Result<bool> {
        let bucket = self.header.bucket_of(key);
        let guard = self.update_lock.upgradable_read();

        let mut previous: Option<u32> = None;
        let mut current = self.header.read(bucket)?;

        while current != u32::NOT_FOUND {
            let memory = self.manager.get(current)?;
            let next = load_link::<u32>(&memory, K);

            if &memory.buffer()[..K] == key {
                drop(memory);
                return match previous {
                    // Head case: the bucket itself points past the cell.
                    None => {
                        let _write = RwLockUpgradableReadGuard::upgrade(guard);
                        self.header.write(bucket, next)?;
                        Ok(true)
                    }
                    // Interior case: the predecessor points past it.
                    Some(link) => {
                        let memory = self.manager.get(link)?;
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

    fn serialize(&self, write: impl FnOnce(&mut Vec<u8>)) -> Result<Vec<u8>> {
        let mut value = Vec::with_capacity(self.value_size);
        write(&mut value);

        if value.len() != self.value_size {
            return Err(StoreError::ShortWrite {
                reserved: self.value_size,
                written: value.len(),
            }
            .into());
        }

        Ok(value)
    }
}
