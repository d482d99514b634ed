//! # Store Lifecycle
//!
//! The store owns a directory of table files and sequences their
//! lifecycle: create, open under locks, per-write flush discipline, and
//! close.
//!
//! ## Locks
//!
//! Opening acquires the exclusive lock (one process per store), then
//! probes the flush lock, a sentinel that a crashed session leaves
//! behind. A held flush lock means the previous process never flushed
//! cleanly, and the store refuses to open rather than serve torn state.
//!
//! In deferred mode (`flush_writes = false`) the flush sentinel is held
//! for the whole session and writes are flushed once, at close. In
//! flush-per-write mode each `begin_write`/`end_write` pair creates the
//! sentinel, flushes, and removes it.

use std::path::PathBuf;

use eyre::WrapErr;
use tracing::{debug, info};

use crate::databases::{BlockDatabase, HistoryDatabase, SpendDatabase, TransactionDatabase};
use crate::error::{Result, StoreError};
use crate::locks::{ExclusiveLock, FlushLock};
use crate::memory::FileStorage;
use crate::settings::Settings;

pub const FLUSH_LOCK: &str = "flush_lock";
pub const EXCLUSIVE_LOCK: &str = "exclusive_lock";
pub const HEADER_INDEX: &str = "header_index";
pub const BLOCK_INDEX: &str = "block_index";
pub const BLOCK_TABLE: &str = "block_table";
pub const TRANSACTION_INDEX: &str = "transaction_index";
pub const TRANSACTION_TABLE: &str = "transaction_table";
pub const SPEND_TABLE: &str = "spend_table";
pub const HISTORY_TABLE: &str = "history_table";
pub const HISTORY_ROWS: &str = "history_rows";

/// An open store: the table set plus the locks that guard it.
#[derive(Debug)]
pub struct Store {
    settings: Settings,
    flush_lock: FlushLock,
    _exclusive_lock: ExclusiveLock,
    blocks: BlockDatabase,
    transactions: TransactionDatabase,
    spends: SpendDatabase,
    history: Option<HistoryDatabase>,
}

impl Store {
    /// Creates and initializes every content file, honoring
    /// `index_addresses`, then leaves the store closed. Refuses with
    /// `AlreadyExists` when any content file is present.
    pub fn create(settings: &Settings) -> Result<()> {
        std::fs::create_dir_all(&settings.directory)
            .map_err(StoreError::Io)
            .wrap_err_with(|| {
                format!(
                    "failed to create store directory '{}'",
                    settings.directory.display()
                )
            })?;

        let files = Self::content_files(settings);
        for path in &files {
            if path.exists() {
                return Err(StoreError::AlreadyExists(path.clone()).into());
            }
        }
        for path in &files {
            FileStorage::create(path)?;
        }

        let tables = Self::open_tables(settings)?;
        tables.blocks.create()?;
        tables.transactions.create()?;
        tables.spends.create()?;
        if let Some(history) = &tables.history {
            history.create()?;
        }
        tables.close()?;

        info!(directory = %settings.directory.display(), "store created");
        Ok(())
    }

    /// Opens the store: exclusive lock, flush-lock probe, session flush
    /// hold in deferred mode, then every table. A failure releases the
    /// locks acquired so far before returning.
    pub fn open(settings: Settings) -> Result<Self> {
        let exclusive_lock = ExclusiveLock::lock(settings.directory.join(EXCLUSIVE_LOCK))?;

        let flush_lock = FlushLock::new(settings.directory.join(FLUSH_LOCK));
        flush_lock.try_lock()?;

        let session_hold = !settings.flush_writes;
        if session_hold {
            flush_lock.lock_shared()?;
        }

        let tables = match Self::open_tables(&settings).and_then(|tables| {
            tables.blocks.open()?;
            tables.transactions.open()?;
            tables.spends.open()?;
            if let Some(history) = &tables.history {
                history.open()?;
            }
            Ok(tables)
        }) {
            Ok(tables) => tables,
            Err(error) => {
                if session_hold {
                    let _ = flush_lock.unlock_shared();
                }
                drop(exclusive_lock);
                return Err(error);
            }
        };

        info!(directory = %settings.directory.display(), "store opened");

        Ok(Self {
            settings,
            flush_lock,
            _exclusive_lock: exclusive_lock,
            blocks: tables.blocks,
            transactions: tables.transactions,
            spends: tables.spends,
            history: tables.history,
        })
    }

    /// Closes every table, releases the flush hold and then the
    /// exclusive lock. A store dropped without `close` leaves the flush
    /// sentinel behind and the next open refuses with `LockHeld`.
    pub fn close(self) -> Result<()> {
        self.blocks.close()?;
        self.transactions.close()?;
        self.spends.close()?;
        if let Some(history) = &self.history {
            history.close()?;
        }

        if !self.settings.flush_writes {
            self.flush_lock.unlock_shared()?;
        }

        info!(directory = %self.settings.directory.display(), "store closed");
        Ok(())
    }

    /// In flush-per-write mode, marks the write in progress. A crash
    /// before the matching `end_write` is detected on the next open.
    pub fn begin_write(&self) -> Result<()> {
        if self.settings.flush_writes {
            self.flush_lock.lock_shared()?;
        }
        Ok(())
    }

    /// In flush-per-write mode, flushes and clears the write marker.
    pub fn end_write(&self) -> Result<()> {
        if self.settings.flush_writes {
            self.flush()?;
            self.flush_lock.unlock_shared()?;
        }
        Ok(())
    }

    /// Persists every table's allocation watermark, committing the
    /// writes since the last commit.
    pub fn commit(&self) -> Result<()> {
        debug!("committing watermarks");
        self.blocks.commit()?;
        self.transactions.commit()?;
        self.spends.commit()?;
        if let Some(history) = &self.history {
            history.commit()?;
        }
        Ok(())
    }

    /// Synchronously writes every table's dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.blocks.flush()?;
        self.transactions.flush()?;
        self.spends.flush()?;
        if let Some(history) = &self.history {
            history.flush()?;
        }
        Ok(())
    }

    pub fn blocks(&self) -> &BlockDatabase {
        &self.blocks
    }

    pub fn transactions(&self) -> &TransactionDatabase {
        &self.transactions
    }

    pub fn spends(&self) -> &SpendDatabase {
        &self.spends
    }

    /// The address-history table, when `index_addresses` is set.
    pub fn history(&self) -> Option<&HistoryDatabase> {
        self.history.as_ref()
    }

    fn content_files(settings: &Settings) -> Vec<PathBuf> {
        let directory = &settings.directory;
        let mut files = vec![
            directory.join(BLOCK_TABLE),
            directory.join(BLOCK_INDEX),
            directory.join(HEADER_INDEX),
            directory.join(TRANSACTION_TABLE),
            directory.join(TRANSACTION_INDEX),
            directory.join(SPEND_TABLE),
        ];

        if settings.index_addresses {
            files.push(directory.join(HISTORY_TABLE));
            files.push(directory.join(HISTORY_ROWS));
        }

        files
    }

    fn open_tables(settings: &Settings) -> Result<Tables> {
        let directory = &settings.directory;
        let growth = settings.growth_rate();

        let blocks = BlockDatabase::new(
            directory.join(BLOCK_TABLE),
            directory.join(BLOCK_INDEX),
            directory.join(HEADER_INDEX),
            settings.block_table_buckets,
            growth,
        )?;

        let transactions = TransactionDatabase::new(
            directory.join(TRANSACTION_TABLE),
            directory.join(TRANSACTION_INDEX),
            settings.transaction_table_buckets,
            growth,
        )?;

        let spends = SpendDatabase::new(
            directory.join(SPEND_TABLE),
            settings.spend_table_buckets,
            growth,
        )?;

        let history = if settings.index_addresses {
            Some(HistoryDatabase::new(
                directory.join(HISTORY_TABLE),
                directory.join(HISTORY_ROWS),
                settings.history_table_buckets,
                growth,
            )?)
        } else {
            None
        };

        Ok(Tables {
            blocks,
            transactions,
            spends,
            history,
        })
    }
}

/// The table set between construction and ownership by a `Store`.
struct Tables {
    blocks: BlockDatabase,
    transactions: TransactionDatabase,
    spends: SpendDatabase,
    history: Option<HistoryDatabase>,
}

impl Tables {
    fn close(&self) -> Result<()> {
        self.blocks.close()?;
        self.transactions.close()?;
        self.spends.close()?;
        if let Some(history) = &self.history {
            history.close()?;
        }
        Ok(())
    }
}
