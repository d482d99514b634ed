//! # Table Files
//!
//! The higher-level tables, each binding one or more hash tables and
//! append-only record arrays over dedicated storage files:
//!
//! - [`BlockDatabase`]: blocks by hash, plus confirmed and header height
//!   indexes.
//! - [`TransactionDatabase`]: transactions by hash, plus an arrival-order
//!   index.
//! - [`SpendDatabase`]: output point → spending input point.
//! - [`HistoryDatabase`]: payment address → row list of history entries.
//!
//! Payloads are opaque serialized bytes and keys are fixed-width byte
//! arrays; hashing and schema belong to the caller. Every table exposes
//! the same lifecycle: `create`, `open`, `commit` (persist watermarks),
//! `flush` (sync the maps), `close`.

pub mod block_database;
pub mod history_database;
pub mod spend_database;
pub mod transaction_database;

pub use block_database::{BlockDatabase, BlockResult};
pub use history_database::{HistoryDatabase, HistoryStatInfo};
pub use spend_database::{SpendDatabase, SpendStatInfo};
pub use transaction_database::{TransactionDatabase, TransactionResult};

use eyre::ensure;
use zerocopy::little_endian::{U32, U64};
use zerocopy::FromBytes;

use crate::error::Result;

/// Parses a little-endian u32 from the front of a byte slice.
pub(crate) fn parse_le_u32(bytes: &[u8]) -> Result<u32> {
    ensure!(bytes.len() >= 4, "buffer too small for u32: {}", bytes.len());
    let word = U32::ref_from_bytes(&bytes[..4])
        .map_err(|error| eyre::eyre!("failed to parse u32: {:?}", error))?;
    Ok(word.get())
}

/// Parses a little-endian u64 from the front of a byte slice.
pub(crate) fn parse_le_u64(bytes: &[u8]) -> Result<u64> {
    ensure!(bytes.len() >= 8, "buffer too small for u64: {}", bytes.len());
    let word = U64::ref_from_bytes(&bytes[..8])
        .map_err(|error| eyre::eyre!("failed to parse u64: {:?}", error))?;
    Ok(word.get())
}
