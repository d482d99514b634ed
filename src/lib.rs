//! # chaindb - Blockchain Storage Engine
//!
//! chaindb is the on-disk storage engine of a blockchain database: a
//! family of memory-mapped, chained-hash-table files persisting blocks,
//! transactions, spends, and address histories, together with the
//! file/lock lifecycle that coordinates them. This implementation
//! prioritizes:
//!
//! - **Zero-copy reads**: lookups return accessors straight into the map
//! - **Crash safety by watermark**: a single committed word per file
//! - **Concurrent readers**: lock-free lookups except for remap exclusion
//!
//! ## Quick Start
//!
//! ```ignore
//! use chaindb::{Settings, Store};
//!
//! let settings = Settings::with_directory("./chain");
//! Store::create(&settings)?;
//!
//! let store = Store::open(settings)?;
//! store.transactions().store(&tx_hash, height, position, &tx_bytes)?;
//! store.commit()?;
//!
//! if let Some(result) = store.transactions().get(&tx_hash)? {
//!     let bytes = result.bytes();
//! }
//! store.close()?;
//! ```
//!
//! ## Architecture
//!
//! The engine is layered, leaves first:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Store (locks, lifecycle)          │
//! ├─────────────────────────────────────────┤
//! │  Table files (block / tx / spend / ...) │
//! ├─────────────────────────────────────────┤
//! │  Chained hash tables (record / slab)    │
//! ├─────────────────────────────────────────┤
//! │  Managers (bump alloc + watermark)      │
//! ├─────────────────────────────────────────┤
//! │  FileStorage (growable mmap + remap)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A store directory holds one file per table component plus two lock
//! files:
//!
//! ```text
//! chain/
//! ├── block_table          # slab hash table: hash → block
//! ├── block_index          # height → slab offset
//! ├── header_index         # header height → slab offset
//! ├── transaction_table    # slab hash table: hash → transaction
//! ├── transaction_index    # arrival order → slab offset
//! ├── spend_table          # record hash table: outpoint → inpoint
//! ├── history_table        # optional: address → row list head
//! ├── history_rows         # optional: history row chains
//! ├── flush_lock           # dirty-session sentinel
//! └── exclusive_lock       # one process per store
//! ```
//!
//! ## Concurrency Model
//!
//! Parallel OS threads, no async. Reads are concurrent and lock-free
//! except that live accessors block a remap. `store` serializes against
//! other `store`s per table; `update`/`unlink` require a single
//! structural writer per table. See the `primitives` module docs.
//!
//! ## Module Overview
//!
//! - [`memory`]: growable memory-mapped storage and scoped accessors
//! - [`primitives`]: managers, bucket headers, chained hash tables
//! - [`databases`]: block, transaction, spend, and history tables
//! - [`store`]: file set, advisory locks, open/close/flush sequencing
//! - [`settings`]: store configuration
//! - [`error`]: classified failure kinds

pub mod databases;
pub mod error;
pub mod locks;
pub mod memory;
pub mod primitives;
pub mod settings;
pub mod store;

pub use error::{Result, StoreError};
pub use settings::Settings;
pub use store::Store;
