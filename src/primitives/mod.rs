//! # Storage Primitives
//!
//! The building blocks every table file is assembled from, in dependency
//! order:
//!
//! - [`link`]: the link word, a record index (`u32`) or a slab byte
//!   offset (`u64`), with all-ones as the absent sentinel.
//! - [`RecordManager`] / [`SlabManager`]: bump allocators above a
//!   [`FileStorage`](crate::memory::FileStorage), persisting a single
//!   `used_bytes` watermark as the commit point.
//! - [`HashTableHeader`]: the persisted bucket array.
//! - [`RecordHashTable`] / [`SlabHashTable`]: chained hash tables joining
//!   a header with a manager.
//! - [`RecordMultimap`]: per-key row lists for the address-history table.
//!
//! ## File Layout
//!
//! Every hash-table file is laid out as:
//!
//! ```text
//! offset 0   [ used_bytes    : 8 bytes LE ]   manager watermark
//! offset 8   [ bucket_count  : 4 bytes LE ]   table header
//!            [ bucket[0..N]  : L bytes LE each ]
//!            [ cells: key | next | value ... ] bump-allocated
//! ```
//!
//! Pure index files (no hash table) place their cells directly after the
//! watermark. All multi-byte integers are little-endian.

pub mod hash_table_header;
pub mod link;
pub mod record_hash_table;
pub mod record_manager;
pub mod record_multimap;
pub mod slab_hash_table;
pub mod slab_manager;

pub use hash_table_header::HashTableHeader;
pub use link::Link;
pub use record_hash_table::RecordHashTable;
pub use record_manager::RecordManager;
pub use record_multimap::RecordMultimap;
pub use slab_hash_table::SlabHashTable;
pub use slab_manager::SlabManager;

/// Bytes reserved at the start of every file for the manager watermark.
pub const WATERMARK_SIZE: u64 = 8;

/// File offset of a hash-table header, directly after the watermark.
pub const TABLE_HEADER_OFFSET: u64 = WATERMARK_SIZE;
