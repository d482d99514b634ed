//! # Scoped Memory Accessor
//!
//! [`Memory`] is a handle to a byte address inside the current mapping.
//! It owns a shared hold on the storage's remap lock, so the mapping
//! cannot be remapped or unmapped beneath it; dropping the handle releases
//! the hold. Accessors are cheap and short-lived by convention, since a
//! grow blocks on every one of them.

use std::ptr;
use std::slice;

use parking_lot::RwLockReadGuard;

use crate::memory::file_storage::MapInner;

/// A pinned pointer into the mapping at a fixed byte offset.
#[derive(Debug)]
pub struct Memory<'a> {
    guard: RwLockReadGuard<'a, MapInner>,
    offset: u64,
}

impl<'a> Memory<'a> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, MapInner>, offset: u64) -> Self {
        Self { guard, offset }
    }

    /// Byte offset of this accessor within the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The mapped bytes from this accessor's offset to the end of the
    /// mapping. The caller knows the width of the cell it addressed.
    pub fn buffer(&self) -> &[u8] {
        let length = (self.guard.capacity() - self.offset) as usize;

        // SAFETY: the read guard pins the mapping, the offset was bounds
        // checked at access time, and concurrent writers only touch bytes
        // no published link reaches (see module docs in memory/mod.rs).
        unsafe { slice::from_raw_parts(self.guard.base().add(self.offset as usize), length) }
    }

    /// Raw pointer `at` bytes past this accessor's offset. Used for the
    /// single-word link loads and stores in the hash tables.
    pub(crate) fn raw_at(&self, at: usize) -> *mut u8 {
        debug_assert!(self.offset + at as u64 <= self.guard.capacity());

        // SAFETY: in bounds per the debug assertion; validity is pinned by
        // the read guard.
        unsafe { self.guard.base().add(self.offset as usize + at) }
    }

    /// Copies `bytes` into the mapping `at` bytes past the offset. The
    /// target must be an unpublished cell, or a region owned exclusively
    /// by the caller under its table's update lock.
    pub(crate) fn write_bytes(&self, at: usize, bytes: &[u8]) {
        debug_assert!(self.offset + (at + bytes.len()) as u64 <= self.guard.capacity());

        // SAFETY: in bounds per the debug assertion; exclusivity of the
        // target bytes is the caller's contract stated above.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.raw_at(at), bytes.len());
        }
    }
}
