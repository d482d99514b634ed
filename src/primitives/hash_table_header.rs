//! # Hash-Table Header
//!
//! The persisted bucket array of a hash table, stored directly after the
//! manager watermark:
//!
//! ```text
//! offset 8   [ bucket_count : 4 bytes LE ]
//! offset 12  [ bucket[0]    : L bytes LE ]
//!            [ bucket[1]    : L bytes LE ]
//!            ...
//! ```
//!
//! Each bucket holds the head link of its collision chain, or `NOT_FOUND`
//! when empty. The count is fixed at create time; `start` refuses a file
//! whose persisted count differs from the configuration.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::ensure;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Result, StoreError};
use crate::memory::FileStorage;
use crate::primitives::link::{load_link, store_link, Link};
use crate::primitives::TABLE_HEADER_OFFSET;

/// Width of the persisted bucket count.
const COUNT_SIZE: u64 = 4;

/// Persisted bucket array serving head-of-chain links.
#[derive(Debug)]
pub struct HashTableHeader<L: Link> {
    storage: Arc<FileStorage>,
    buckets: u32,
    _link: PhantomData<L>,
}

impl<L: Link> HashTableHeader<L> {
    pub fn new(storage: Arc<FileStorage>, buckets: u32) -> Self {
        Self {
            storage,
            buckets,
            _link: PhantomData,
        }
    }

    /// Header size in bytes for a given bucket count.
    pub fn size(buckets: u32) -> u64 {
        COUNT_SIZE + buckets as u64 * L::SIZE as u64
    }

    pub fn buckets(&self) -> u32 {
        self.buckets
    }

    /// Writes the bucket count and fills every bucket with `NOT_FOUND`.
    pub fn create(&self) -> Result<()> {
        ensure!(self.buckets > 0, "hash table requires at least one bucket");

        self.storage
            .resize(TABLE_HEADER_OFFSET + Self::size(self.buckets))?;

        let memory = self.storage.access(TABLE_HEADER_OFFSET)?;
        memory.write_bytes(0, U32::new(self.buckets).as_bytes());

        for bucket in 0..self.buckets {
            store_link(
                L::NOT_FOUND,
                &memory,
                (COUNT_SIZE as usize) + bucket as usize * L::SIZE,
            );
        }

        Ok(())
    }

    /// Validates the persisted bucket count against the configuration.
    pub fn start(&self) -> Result<()> {
        let end = TABLE_HEADER_OFFSET + Self::size(self.buckets);
        if self.storage.size() < end {
            return Err(StoreError::CorruptHeader(format!(
                "'{}' is shorter than its own header ({} < {})",
                self.storage.path().display(),
                self.storage.size(),
                end
            ))
            .into());
        }

        let memory = self.storage.access(TABLE_HEADER_OFFSET)?;
        let stored = U32::ref_from_bytes(&memory.buffer()[..COUNT_SIZE as usize])
            .map_err(|error| eyre::eyre!("failed to parse bucket count: {:?}", error))?
            .get();

        if stored != self.buckets {
            return Err(StoreError::CorruptHeader(format!(
                "'{}' holds {} buckets, configured for {}",
                self.storage.path().display(),
                stored,
                self.buckets
            ))
            .into());
        }

        Ok(())
    }

    /// Head link of the given bucket's chain.
    pub fn read(&self, bucket: u32) -> Result<L> {
        ensure!(
            bucket < self.buckets,
            "bucket {} out of range ({} buckets)",
            bucket,
            self.buckets
        );

        let memory = self.storage.access(TABLE_HEADER_OFFSET)?;
        Ok(load_link(
            &memory,
            COUNT_SIZE as usize + bucket as usize * L::SIZE,
        ))
    }

    /// Rewrites the given bucket's head link.
    pub fn write(&self, bucket: u32, link: L) -> Result<()> {
        ensure!(
            bucket < self.buckets,
            "bucket {} out of range ({} buckets)",
            bucket,
            self.buckets
        );

        let memory = self.storage.access(TABLE_HEADER_OFFSET)?;
        store_link(link, &memory, COUNT_SIZE as usize + bucket as usize * L::SIZE);
        Ok(())
    }

    /// Maps a key to its bucket: the first `min(key_len, 8)` key bytes,
    /// loaded little-endian and zero-extended, modulo the bucket count.
    pub fn bucket_of(&self, key: &[u8]) -> u32 {
        let take = key.len().min(8);
        let mut word = [0u8; 8];
        word[..take].copy_from_slice(&key[..take]);
        (u64::from_le_bytes(word) % self.buckets as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn storage(dir: &tempfile::TempDir) -> Arc<FileStorage> {
        let path = dir.path().join("table");
        FileStorage::create(&path).unwrap();
        Arc::new(FileStorage::open(&path, 50).unwrap())
    }

    #[test]
    fn create_then_start_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);

        let header = HashTableHeader::<u32>::new(storage.clone(), 100);
        header.create().unwrap();
        header.start().unwrap();

        for bucket in [0, 50, 99] {
            assert_eq!(header.read(bucket).unwrap(), u32::NOT_FOUND);
        }
    }

    #[test]
    fn start_with_mismatched_buckets_fails() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);

        HashTableHeader::<u32>::new(storage.clone(), 100)
            .create()
            .unwrap();

        let reopened = HashTableHeader::<u32>::new(storage, 99);
        let err = reopened.start().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::CorruptHeader(_))
        ));
    }

    #[test]
    fn write_and_read_bucket() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);

        let header = HashTableHeader::<u64>::new(storage, 10);
        header.create().unwrap();

        header.write(3, 4096).unwrap();
        assert_eq!(header.read(3).unwrap(), 4096);
        assert_eq!(header.read(4).unwrap(), u64::NOT_FOUND);
    }

    #[test]
    fn bucket_of_is_le_load_mod_count() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);

        let header = HashTableHeader::<u32>::new(storage, 100);
        header.create().unwrap();

        // 0xefbeadde % 100, little-endian load of the key bytes.
        let key = [0xde, 0xad, 0xbe, 0xef];
        assert_eq!(header.bucket_of(&key), (0xefbeaddeu64 % 100) as u32);

        // Short keys zero-extend.
        assert_eq!(header.bucket_of(&[7]), 7);
    }

    #[test]
    fn bucket_of_spreads_random_keys() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);

        let buckets = 64;
        let header = HashTableHeader::<u32>::new(storage, buckets);
        header.create().unwrap();

        // Cheap xorshift over the key space; every bucket should land.
        let mut hits = vec![0u32; buckets as usize];
        let mut state = 0x9e3779b97f4a7c15u64;
        for _ in 0..4096 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let key = state.to_le_bytes();
            hits[header.bucket_of(&key) as usize] += 1;
        }

        let max = *hits.iter().max().unwrap();
        let min = *hits.iter().min().unwrap();
        assert!(min > 0, "some bucket never hit");
        assert!(max < min * 4, "distribution badly skewed: {min}..{max}");
    }
}
