//! # Store Locks
//!
//! Two locks coordinate store lifecycles:
//!
//! - [`ExclusiveLock`] is an advisory OS file lock (`flock`) keeping a
//!   second process from opening the same store. It evaporates with the
//!   process, which is exactly right: a crashed owner must not fence out
//!   the next one.
//! - [`FlushLock`] distinguishes a clean shutdown from a dirty crash, so
//!   it must survive process death: it is a sentinel file, not an OS
//!   lock. `try_lock` probes that no sentinel exists; `lock_shared`
//!   creates it; `unlock_shared` removes it. A store that crashes between
//!   the two leaves the sentinel behind and the next open refuses with
//!   `LockHeld`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use eyre::WrapErr;

use crate::error::{Result, StoreError};

/// Advisory OS lock held for the lifetime of an open store.
#[derive(Debug)]
pub struct ExclusiveLock {
    _file: File,
    path: PathBuf,
}

impl ExclusiveLock {
    /// Creates the lock file if needed and try-locks it exclusively.
    /// Fails with `LockHeld` when another process holds it.
    pub fn lock<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to open lock file '{}'", path.display()))?;

        Self::try_flock(&file).map_err(|_| StoreError::LockHeld(path.clone()))?;

        Ok(Self { _file: file, path })
    }

    #[cfg(unix)]
    fn try_flock(file: &File) -> std::io::Result<()> {
        // SAFETY: flock on a valid owned descriptor; non-blocking, so no
        // state is left behind on failure.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_flock(_file: &File) -> std::io::Result<()> {
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock. Dropping has the same effect; the OS also
    /// releases on process exit.
    pub fn unlock(self) {}
}

/// Sentinel-file lock marking a session with unflushed writes.
#[derive(Debug)]
pub struct FlushLock {
    path: PathBuf,
}

impl FlushLock {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Verifies no sentinel survives from a prior session. `LockHeld`
    /// indicates the previous process never flushed cleanly.
    pub fn try_lock(&self) -> Result<()> {
        if self.path.exists() {
            return Err(StoreError::LockHeld(self.path.clone()).into());
        }
        Ok(())
    }

    /// Marks unflushed writes by creating the sentinel. Idempotent within
    /// a session.
    pub fn lock_shared(&self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)
            .map_err(StoreError::Io)
            .wrap_err_with(|| {
                format!("failed to create flush sentinel '{}'", self.path.display())
            })?;
        Ok(())
    }

    /// Clears the sentinel after a flush.
    pub fn unlock_shared(&self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .map_err(StoreError::Io)
            .wrap_err_with(|| {
                format!("failed to remove flush sentinel '{}'", self.path.display())
            })?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exclusive_lock_rejects_second_holder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exclusive_lock");

        let first = ExclusiveLock::lock(&path).unwrap();
        let second = ExclusiveLock::lock(&path);

        assert!(matches!(
            second.unwrap_err().downcast_ref::<StoreError>(),
            Some(StoreError::LockHeld(_))
        ));

        drop(first);
        ExclusiveLock::lock(&path).unwrap();
    }

    #[test]
    fn flush_lock_sentinel_roundtrip() {
        let dir = tempdir().unwrap();
        let lock = FlushLock::new(dir.path().join("flush_lock"));

        lock.try_lock().unwrap();
        lock.lock_shared().unwrap();

        // A fresh probe now sees the sentinel, as a new process would.
        let probe = FlushLock::new(lock.path());
        assert!(matches!(
            probe.try_lock().unwrap_err().downcast_ref::<StoreError>(),
            Some(StoreError::LockHeld(_))
        ));

        lock.unlock_shared().unwrap();
        probe.try_lock().unwrap();
    }
}
