//! # Memory-Mapped Storage
//!
//! The foundation of every table file: a growable, memory-mapped byte
//! region with scoped accessors that remain valid across concurrent reads
//! and reallocating writes.
//!
//! ## Remap Safety Model
//!
//! A mapping becomes invalid the moment the file grows and is remapped.
//! Encoding this in the borrow checker (`&mut self` for grow) cannot
//! express this engine's contract, where readers stay live on one thread
//! while another thread allocates, so the exclusion is a runtime
//! readers/writer lock instead:
//!
//! ```text
//! FileStorage::access(offset)  -> Memory      // shared remap hold
//! FileStorage::reserve(bytes)                 // exclusive remap hold
//! ```
//!
//! Every [`Memory`] accessor carries a read guard on the remap lock for
//! its whole lifetime. A grow blocks until all accessors are released, so
//! no accessor ever observes a stale base address.
//!
//! ## Write Discipline
//!
//! Writes go through an accessor into a region that is either not yet
//! published (no bucket or link points at it) or a single link word
//! rewritten under the owning table's update lock. Published non-link
//! bytes are never rewritten except by `update`, which holds the update
//! lock exclusively.
//!
//! ## File Lifecycle
//!
//! Files are created with a one-byte sentinel (a mapping of an empty file
//! is invalid), opened by mapping the full file length, grown by a
//! configurable rate rounded up to the page size, and truncated back to
//! the logical size on close.

mod accessor;
mod file_storage;

pub use accessor::Memory;
pub use file_storage::FileStorage;
