//! # Record Multimap
//!
//! Per-key row lists, built for the address-history table: a record hash
//! table whose 4-byte value is the head link into a second record manager
//! holding rows of `[next: u32 | value]`. New rows are pushed at the head
//! of the key's list, so iteration is newest-first.
//!
//! The lookup table and the row file are separate storage files; both
//! watermarks commit via [`sync`](RecordMultimap::sync).

use eyre::ensure;

use crate::error::{Result, StoreError};
use crate::memory::Memory;
use crate::primitives::link::{load_link, store_link, Link};
use crate::primitives::{RecordHashTable, RecordManager};

/// Width of the in-row next link.
const LINK_SIZE: usize = 4;

/// A hash table mapping each key to a linked list of fixed-size rows.
#[derive(Debug)]
pub struct RecordMultimap<const K: usize> {
    map: RecordHashTable<K>,
    rows: RecordManager,
    row_value_size: usize,
}

impl<const K: usize> RecordMultimap<K> {
    /// The lookup table's value width: one row link.
    pub const MAP_VALUE_SIZE: usize = LINK_SIZE;

    /// Row cell width for a given row value size.
    pub fn row_size(value_size: usize) -> u64 {
        (LINK_SIZE + value_size) as u64
    }

    /// Joins a lookup table (value width 4) with a row manager.
    pub fn new(map: RecordHashTable<K>, rows: RecordManager) -> Result<Self> {
        ensure!(
            map.value_size() == Self::MAP_VALUE_SIZE,
            "multimap lookup table must store a single row link, got {} value bytes",
            map.value_size()
        );
        ensure!(
            rows.record_size() > LINK_SIZE as u64,
            "row size {} leaves no value bytes after the link",
            rows.record_size()
        );

        let row_value_size = (rows.record_size() - LINK_SIZE as u64) as usize;
        Ok(Self {
            map,
            rows,
            row_value_size,
        })
    }

    pub fn row_value_size(&self) -> usize {
        self.row_value_size
    }

    /// Buckets in the lookup table.
    pub fn buckets(&self) -> u32 {
        self.map.buckets()
    }

    /// Rows allocated across all keys, reachable or not.
    pub fn rows(&self) -> u32 {
        self.rows.count()
    }

    pub fn create(&self) -> Result<()> {
        self.map.create()?;
        self.rows.create()
    }

    pub fn start(&self) -> Result<()> {
        self.map.start()?;
        self.rows.start()
    }

    pub fn sync(&self) -> Result<()> {
        self.map.sync()?;
        self.rows.sync()
    }

    /// Pushes a row at the head of `key`'s list, creating the key mapping
    /// on first use. The writer must fill exactly
    /// [`row_value_size`](Self::row_value_size) bytes.
    pub fn store(&self, key: &[u8; K], write: impl FnOnce(&mut Vec<u8>)) -> Result<u32> {
        let mut value = Vec::with_capacity(self.row_value_size);
        write(&mut value);

        if value.len() != self.row_value_size {
            return Err(StoreError::ShortWrite {
                reserved: self.row_value_size,
                written: value.len(),
            }
            .into());
        }

        let head = self.find(key)?;
        let row = self.rows.new_records(1)?;
        {
            // The new row points at the old head before anything points
            // at the new row, so readers always see a complete list.
            let memory = self.rows.get(row)?;
            store_link(head.unwrap_or(u32::NOT_FOUND), &memory, 0);
            memory.write_bytes(LINK_SIZE, &value);
        }

        let link_bytes = row.to_le_bytes();
        match head {
            Some(_) => {
                self.map.update(key, |buffer| buffer.extend_from_slice(&link_bytes))?;
            }
            None => {
                self.map.store(key, |buffer| buffer.extend_from_slice(&link_bytes))?;
            }
        }

        Ok(row)
    }

    /// Head row link of `key`'s list.
    pub fn find(&self, key: &[u8; K]) -> Result<Option<u32>> {
        let Some(memory) = self.map.find(key)? else {
            return Ok(None);
        };

        let head = load_link::<u32>(&memory, 0);
        Ok(Some(head))
    }

    /// Value bytes of the row at `link`.
    pub fn get(&self, link: u32) -> Result<Memory<'_>> {
        self.rows.get_at(link, LINK_SIZE as u64)
    }

    /// The row after `link` in its list, or `None` at the tail.
    pub fn next(&self, link: u32) -> Result<Option<u32>> {
        let memory = self.rows.get(link)?;
        let next = load_link::<u32>(&memory, 0);
        Ok((next != u32::NOT_FOUND).then_some(next))
    }

    /// Pops the head row of `key`'s list; removes the key mapping when
    /// the list empties. Row storage is leaked. Requires the
    /// single-structural-writer discipline.
    pub fn unlink(&self, key: &[u8; K]) -> Result<bool> {
        let Some(head) = self.find(key)? else {
            return Ok(false);
        };

        match self.next(head)? {
            Some(next) => {
                let link_bytes = next.to_le_bytes();
                self.map.update(key, |buffer| buffer.extend_from_slice(&link_bytes))?;
            }
            None => {
                self.map.unlink(key)?;
            }
        }

        Ok(true)
    }
}
