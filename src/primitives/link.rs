//! # Link Words
//!
//! A cell's identity is its link: a zero-based record index (`u32`) or a
//! byte offset (`u64`). The all-ones value of the width denotes absence.
//!
//! Link words are the only bytes rewritten after a cell is published, so
//! their loads and stores are single unaligned word operations. A reader
//! racing an unlink observes either the old or the new link, never a
//! mixture, because the rewrite happens under the owning table's update
//! lock while readers hold it shared for each crossing.

use std::fmt;
use std::ptr;

use crate::memory::Memory;

mod sealed {
    use crate::memory::Memory;

    pub trait Word: Copy {
        fn load(memory: &Memory<'_>, at: usize) -> Self;
        fn store(self, memory: &Memory<'_>, at: usize);
    }
}

/// A table link: `u32` for records, `u64` for slab offsets.
pub trait Link: sealed::Word + Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The absent sentinel, all-ones of the link width.
    const NOT_FOUND: Self;
    /// Serialized width in bytes.
    const SIZE: usize;

    fn to_u64(self) -> u64;
}

impl sealed::Word for u32 {
    fn load(memory: &Memory<'_>, at: usize) -> Self {
        // SAFETY: in-bounds single word load; see module docs for the
        // old-or-new guarantee.
        u32::from_le(unsafe { ptr::read_unaligned(memory.raw_at(at) as *const u32) })
    }

    fn store(self, memory: &Memory<'_>, at: usize) {
        // SAFETY: in-bounds single word store under the update discipline.
        unsafe { ptr::write_unaligned(memory.raw_at(at) as *mut u32, self.to_le()) }
    }
}

impl Link for u32 {
    const NOT_FOUND: Self = u32::MAX;
    const SIZE: usize = 4;

    fn to_u64(self) -> u64 {
        self as u64
    }
}

impl sealed::Word for u64 {
    fn load(memory: &Memory<'_>, at: usize) -> Self {
        // SAFETY: in-bounds single word load; see module docs.
        u64::from_le(unsafe { ptr::read_unaligned(memory.raw_at(at) as *const u64) })
    }

    fn store(self, memory: &Memory<'_>, at: usize) {
        // SAFETY: in-bounds single word store under the update discipline.
        unsafe { ptr::write_unaligned(memory.raw_at(at) as *mut u64, self.to_le()) }
    }
}

impl Link for u64 {
    const NOT_FOUND: Self = u64::MAX;
    const SIZE: usize = 8;

    fn to_u64(self) -> u64 {
        self
    }
}

/// Loads the link word `at` bytes past the accessor's offset.
pub(crate) fn load_link<L: Link>(memory: &Memory<'_>, at: usize) -> L {
    L::load(memory, at)
}

/// Stores the link word `at` bytes past the accessor's offset.
pub(crate) fn store_link<L: Link>(value: L, memory: &Memory<'_>, at: usize) {
    value.store(memory, at)
}
