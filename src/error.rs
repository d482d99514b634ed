//! # Error Kinds
//!
//! Fallible operations across the crate return `eyre::Result`, with rich
//! context added at each layer via `wrap_err_with`. The conditions callers
//! need to branch on (a held lock, a pre-existing store, a corrupt header)
//! are raised as [`StoreError`] values inside the report and recovered with
//! `Report::downcast_ref::<StoreError>()`.
//!
//! Lookup misses are not errors: `find`-style operations return `Option`.

use std::path::PathBuf;

use thiserror::Error;

/// Classified failures of the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An mmap, truncate, or sync call failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A content file was missing at open.
    #[error("file not found: '{0}'")]
    FileNotFound(PathBuf),

    /// Create refused because a content file already exists.
    #[error("file already exists: '{0}'")]
    AlreadyExists(PathBuf),

    /// The exclusive lock is held by another process, or the flush lock
    /// survived a prior unclean shutdown.
    #[error("lock held: '{0}'")]
    LockHeld(PathBuf),

    /// A persisted header disagrees with the configuration or the file.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// A link or slab offset points outside the allocated region.
    #[error("invalid link {0}")]
    InvalidLink(u64),

    /// A value writer produced a different byte count than it reserved.
    #[error("short write: reserved {reserved} bytes, writer produced {written}")]
    ShortWrite { reserved: usize, written: usize },

    /// An allocation would overflow the table's link width.
    #[error("capacity exhausted: allocation of {0} records overflows the link type")]
    CapacityExhausted(u64),
}

/// Crate-wide result alias.
pub type Result<T> = eyre::Result<T>;
