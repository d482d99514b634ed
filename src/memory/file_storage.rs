//! # File-Backed Storage Region
//!
//! `FileStorage` owns an OS file and its memory map. It hands out
//! [`Memory`] accessors that pin the current mapping, and grows the file
//! in place when an allocation runs past capacity.
//!
//! ## Growth
//!
//! `reserve(required)` is a no-op while `required` fits the mapped
//! capacity. Otherwise it takes the remap lock exclusively (waiting for
//! every outstanding accessor), flushes, extends the file to
//! `max(required, capacity + capacity * rate / 100)` rounded up to the
//! page size, and remaps. Either the new mapping is in place or the old
//! one remains; no partial state is observable.
//!
//! ## Logical Size vs Capacity
//!
//! Capacity is the mapped file length and only ever grows while open. The
//! logical size is the high-water mark of bytes actually in use, raised by
//! `resize`; `close` truncates the file back down to it so over-allocation
//! never persists.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{ensure, WrapErr};
use memmap2::MmapMut;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::memory::Memory;

/// Growth is rounded up to this boundary.
const PAGE_ALIGNMENT: u64 = 4096;

/// The mapping plus the raw base address accessors dereference through.
#[derive(Debug)]
pub(crate) struct MapInner {
    map: Option<MmapMut>,
    base: *mut u8,
    capacity: u64,
}

// SAFETY: `base` points into the MmapMut owned by the same MapInner and is
// never dereferenced after the map is dropped or replaced. All shared
// access is mediated by the RwLock around MapInner plus the write
// discipline documented in the module docs.
unsafe impl Send for MapInner {}
unsafe impl Sync for MapInner {}

impl MapInner {
    pub(crate) fn base(&self) -> *mut u8 {
        self.base
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) fn is_open(&self) -> bool {
        self.map.is_some()
    }
}

/// A growable memory-mapped file with remap-safe concurrent accessors.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: File,
    growth_rate: u16,
    size: AtomicU64,
    remap: RwLock<MapInner>,
}

impl FileStorage {
    /// Creates the backing file with a one-byte sentinel so the mapping is
    /// never zero length. Refuses to overwrite an existing file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(StoreError::AlreadyExists(path.to_path_buf()).into());
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    StoreError::AlreadyExists(path.to_path_buf())
                }
                _ => StoreError::Io(source),
            })
            .wrap_err_with(|| format!("failed to create storage file '{}'", path.display()))?;

        file.set_len(1)
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to write sentinel to '{}'", path.display()))?;

        Ok(())
    }

    /// Opens and maps an existing storage file.
    pub fn open<P: AsRef<Path>>(path: P, growth_rate: u16) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(StoreError::FileNotFound(path.to_path_buf()).into());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to open storage file '{}'", path.display()))?;

        let length = file
            .metadata()
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        if length == 0 {
            return Err(StoreError::CorruptHeader(format!(
                "storage file '{}' is empty",
                path.display()
            ))
            .into());
        }

        // SAFETY: the file is opened read+write by this process alone (the
        // store holds an exclusive advisory lock on the directory) and the
        // mapping's lifetime is confined to MapInner, which drops it before
        // the file is truncated at close.
        let mut map = unsafe {
            MmapMut::map_mut(&file)
                .map_err(StoreError::Io)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        let base = map.as_mut_ptr();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            growth_rate,
            size: AtomicU64::new(length),
            remap: RwLock::new(MapInner {
                map: Some(map),
                base,
                capacity: length,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical bytes in use.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Mapped bytes.
    pub fn capacity(&self) -> u64 {
        self.remap.read().capacity
    }

    /// Returns an accessor pinned to the current mapping. While it lives,
    /// any grow that needs a remap blocks.
    pub fn access(&self, offset: u64) -> Result<Memory<'_>> {
        let inner = self.remap.read();

        ensure!(
            inner.is_open(),
            "storage '{}' is closed",
            self.path.display()
        );
        ensure!(
            offset <= inner.capacity,
            "offset {} beyond capacity {} of '{}'",
            offset,
            inner.capacity,
            self.path.display()
        );

        Ok(Memory::new(inner, offset))
    }

    /// Raises the logical size to at least `required`, growing the mapping
    /// first. On failure the logical size is untouched.
    pub fn resize(&self, required: u64) -> Result<()> {
        self.reserve(required)?;
        self.size.fetch_max(required, Ordering::AcqRel);
        Ok(())
    }

    /// Ensures `capacity >= required`, remapping if the file must grow.
    pub fn reserve(&self, required: u64) -> Result<()> {
        if required <= self.remap.read().capacity {
            return Ok(());
        }

        // Blocks until every outstanding accessor releases its hold.
        let mut inner = self.remap.write();

        if required <= inner.capacity {
            return Ok(());
        }

        ensure!(
            inner.is_open(),
            "storage '{}' is closed",
            self.path.display()
        );

        let expanded = inner.capacity + inner.capacity * self.growth_rate as u64 / 100;
        let target = required.max(expanded);
        let target = target.div_ceil(PAGE_ALIGNMENT) * PAGE_ALIGNMENT;

        debug!(
            path = %self.path.display(),
            from = inner.capacity,
            to = target,
            "growing storage"
        );

        if let Some(map) = inner.map.as_ref() {
            map.flush()
                .map_err(StoreError::Io)
                .wrap_err("failed to flush mapping before grow")?;
        }

        self.file
            .set_len(target)
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to extend '{}' to {} bytes", self.path.display(), target))?;

        // SAFETY: the remap lock is held exclusively, so no accessor holds
        // the old base. The old mapping is replaced only after the new one
        // is established; on error the old mapping stays in place.
        let mut map = unsafe {
            MmapMut::map_mut(&self.file)
                .map_err(StoreError::Io)
                .wrap_err_with(|| format!("failed to remap '{}' after grow", self.path.display()))?
        };

        inner.base = map.as_mut_ptr();
        inner.capacity = target;
        inner.map = Some(map);

        Ok(())
    }

    /// Synchronously writes dirty mapped pages to disk.
    pub fn flush(&self) -> Result<()> {
        let inner = self.remap.read();

        let map = inner.map.as_ref().ok_or_else(|| {
            eyre::eyre!("cannot flush closed storage '{}'", self.path.display())
        })?;

        map.flush()
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }

    /// Flushes, unmaps, and truncates the file to the logical size. Any
    /// outstanding accessor at this point is a caller bug and blocks here.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.remap.write();

        let map = inner
            .map
            .take()
            .ok_or_else(|| eyre::eyre!("storage '{}' already closed", self.path.display()))?;

        map.flush()
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to sync '{}' at close", self.path.display()))?;

        drop(map);
        inner.base = std::ptr::null_mut();
        inner.capacity = 0;

        let size = self.size.load(Ordering::Acquire);
        self.file
            .set_len(size)
            .map_err(StoreError::Io)
            .wrap_err_with(|| {
                format!("failed to truncate '{}' to {} bytes", self.path.display(), size)
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage");

        FileStorage::create(&path).unwrap();
        let err = FileStorage::create(&path).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let err = FileStorage::open(dir.path().join("absent"), 50).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::FileNotFound(_))
        ));
    }

    #[test]
    fn open_empty_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::File::create(&path).unwrap();

        let err = FileStorage::open(&path, 50).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::CorruptHeader(_))
        ));
    }

    #[test]
    fn resize_grows_capacity_and_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage");
        FileStorage::create(&path).unwrap();

        let storage = FileStorage::open(&path, 50).unwrap();
        assert_eq!(storage.size(), 1);

        storage.resize(100).unwrap();
        assert_eq!(storage.size(), 100);
        assert!(storage.capacity() >= 100);
        assert_eq!(storage.capacity() % PAGE_ALIGNMENT, 0);
    }

    #[test]
    fn close_truncates_to_logical_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage");
        FileStorage::create(&path).unwrap();

        {
            let storage = FileStorage::open(&path, 50).unwrap();
            storage.resize(100).unwrap();
            assert!(storage.capacity() > 100);
            storage.close().unwrap();
        }

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 100);
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage");
        FileStorage::create(&path).unwrap();

        {
            let storage = FileStorage::open(&path, 50).unwrap();
            storage.resize(16).unwrap();
            let memory = storage.access(0).unwrap();
            memory.write_bytes(0, b"chained-hash-tab");
            drop(memory);
            storage.close().unwrap();
        }

        let storage = FileStorage::open(&path, 50).unwrap();
        let memory = storage.access(0).unwrap();
        assert_eq!(&memory.buffer()[..16], b"chained-hash-tab");
    }

    #[test]
    fn access_beyond_capacity_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage");
        FileStorage::create(&path).unwrap();

        let storage = FileStorage::open(&path, 50).unwrap();
        assert!(storage.access(2).is_err());
    }

    #[test]
    fn double_close_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage");
        FileStorage::create(&path).unwrap();

        let storage = FileStorage::open(&path, 50).unwrap();
        storage.close().unwrap();
        assert!(storage.close().is_err());
        assert!(storage.access(0).is_err());
        assert!(storage.flush().is_err());
    }
}
