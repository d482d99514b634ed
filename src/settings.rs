//! # Store Settings
//!
//! Configuration for a [`Store`](crate::store::Store): the directory, the
//! flush discipline, the file growth rate, and the bucket count of each
//! hash table. Bucket counts are fixed at create time and validated on
//! every subsequent open; opening with a different count fails with
//! `CorruptHeader`.
//!
//! ## Flush modes
//!
//! - `flush_writes = false` (default): writes are flushed once, at close.
//!   Fast, but a crash before close is detected on the next open via the
//!   flush lock and the store refuses to start.
//! - `flush_writes = true`: every `begin_write`/`end_write` pair flushes,
//!   trading throughput for per-write durability.

use std::path::{Path, PathBuf};

/// Growth applied when a file must expand, as a percentage of the current
/// capacity added on top of it.
pub const DEFAULT_GROWTH_RATE: u16 = 50;

/// Expansion below this bound would degenerate into a remap per write.
pub const MIN_GROWTH_RATE: u16 = 10;

pub const DEFAULT_BLOCK_BUCKETS: u32 = 100_000;
pub const DEFAULT_TRANSACTION_BUCKETS: u32 = 200_000;
pub const DEFAULT_SPEND_BUCKETS: u32 = 200_000;
pub const DEFAULT_HISTORY_BUCKETS: u32 = 100_000;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the store's files.
    pub directory: PathBuf,
    /// Flush after every write instead of deferring to close.
    pub flush_writes: bool,
    /// File growth rate in percent, clamped to [`MIN_GROWTH_RATE`].
    pub file_growth_rate: u16,
    /// Bucket count of the block hash table.
    pub block_table_buckets: u32,
    /// Bucket count of the transaction hash table.
    pub transaction_table_buckets: u32,
    /// Bucket count of the spend hash table.
    pub spend_table_buckets: u32,
    /// Bucket count of the address-history hash table.
    pub history_table_buckets: u32,
    /// Maintain the optional address-history tables.
    pub index_addresses: bool,
}

impl Settings {
    /// Default settings rooted at `directory`.
    pub fn with_directory<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            flush_writes: false,
            file_growth_rate: DEFAULT_GROWTH_RATE,
            block_table_buckets: DEFAULT_BLOCK_BUCKETS,
            transaction_table_buckets: DEFAULT_TRANSACTION_BUCKETS,
            spend_table_buckets: DEFAULT_SPEND_BUCKETS,
            history_table_buckets: DEFAULT_HISTORY_BUCKETS,
            index_addresses: false,
        }
    }

    /// Growth rate with the lower bound applied.
    pub fn growth_rate(&self) -> u16 {
        self.file_growth_rate.max(MIN_GROWTH_RATE)
    }
}
